// Archivo: validation.rs
// Propósito: validar una petición de procesamiento antes de crear el job o
// invocar al worker.
use crate::data_type::DataType;
use crate::errors::ProcessingError;
use serde_json::Value as JsonValue;

/// Valida la petición y devuelve el nombre del job del worker.
pub fn validate_request(data_type: DataType,
                        sample_id: &str,
                        file_paths: &[String],
                        inputs: &JsonValue)
                        -> Result<&'static str, ProcessingError> {
  let job_name = data_type.job_name()
                          .ok_or_else(|| ProcessingError::Validation(format!("tipo de dato no soportado: {}", data_type)))?;
  if sample_id.trim().is_empty() {
    return Err(ProcessingError::Validation("sample_id vacío".into()));
  }
  if data_type.requires_files() && file_paths.iter().all(|p| p.trim().is_empty()) {
    return Err(ProcessingError::Validation("No input files provided".into()));
  }
  if data_type == DataType::NutrientAmmonia {
    parse_ammonia_value(inputs)?;
  }
  Ok(job_name)
}

/// `inputs.ammoniaValue` como número finito (acepta número o texto).
pub fn parse_ammonia_value(inputs: &JsonValue) -> Result<f64, ProcessingError> {
  let value = match inputs.get("ammoniaValue") {
    Some(JsonValue::Number(n)) => n.as_f64(),
    Some(JsonValue::String(s)) => s.trim().parse::<f64>().ok(),
    _ => None,
  };
  value.filter(|v| v.is_finite())
       .ok_or_else(|| ProcessingError::Validation("Invalid Ammonia Value".into()))
}
