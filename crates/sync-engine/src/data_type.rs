use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tipos de dato que el coordinador sabe procesar. Cada uno corresponde a un
/// job del worker nativo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    CtdData,
    NutrientAmmonia,
    SequenceData,
    Unknown,
}

impl DataType {
    /// Interpreta la entrada del usuario; `None` si no es un tipo soportado.
    pub fn parse_known(s: &str) -> Option<DataType> {
        s.parse::<DataType>()
         .ok()
         .filter(|t| *t != DataType::Unknown)
    }

    /// Nombre del job que ejecuta el worker para este tipo de dato.
    pub fn job_name(&self) -> Option<&'static str> {
        match self {
            DataType::CtdData => Some("handle_ctd_data"),
            DataType::NutrientAmmonia => Some("handle_nutrient_ammonia"),
            DataType::SequenceData => Some("handle_sequence_data"),
            DataType::Unknown => None,
        }
    }

    /// Los tipos basados en ficheros necesitan al menos un fichero de
    /// entrada.
    pub fn requires_files(&self) -> bool {
        matches!(self, DataType::CtdData | DataType::SequenceData)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::CtdData => "ctd_data",
            DataType::NutrientAmmonia => "nutrient_ammonia",
            DataType::SequenceData => "sequence_data",
            DataType::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for DataType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ctd_data" | "ctd" => Ok(DataType::CtdData),
            "nutrient_ammonia" | "ammonia" => Ok(DataType::NutrientAmmonia),
            "sequence_data" | "sequence" => Ok(DataType::SequenceData),
            _ => Ok(DataType::Unknown),
        }
    }
}

impl Default for DataType {
    fn default() -> Self {
        DataType::Unknown
    }
}
