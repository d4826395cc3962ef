// Archivo: dispatch.rs
// Propósito: traducir una mutación tipada a llamadas del store remoto.
//
// insert -> create, update -> patch, delete -> remove,
// upsert -> exists + (patch | create).
use record_store::{RemoteStore, StoreError};
use sample_domain::{EntityMutation, Mutation, Syncable};

/// Aplica la mutación en el store remoto.
pub async fn dispatch_mutation(remote: &dyn RemoteStore, mutation: &EntityMutation) -> Result<(), StoreError> {
  match mutation {
    EntityMutation::SampleGroup(m) => dispatch_typed(remote, m).await,
    EntityMutation::FileNode(m) => dispatch_typed(remote, m).await,
    EntityMutation::UserSetting(m) => dispatch_typed(remote, m).await,
  }
}

async fn dispatch_typed<T: Syncable>(remote: &dyn RemoteStore, mutation: &Mutation<T>) -> Result<(), StoreError> {
  match mutation {
    Mutation::Insert { record } => remote.create(T::TABLE, &record.to_record()?).await,
    Mutation::Update { id, updates } => remote.patch(T::TABLE, id, updates).await,
    Mutation::Delete { id } => remote.remove(T::TABLE, id).await,
    Mutation::Upsert { record } => {
      let record = record.to_record()?;
      if remote.exists(T::TABLE, &record.id).await? {
        let fields = record.data
                           .as_object()
                           .cloned()
                           .ok_or_else(|| StoreError::Serialization(format!("{} {}: el documento no es un objeto",
                                                                            T::TABLE,
                                                                            record.id)))?;
        remote.patch(T::TABLE, &record.id, &fields).await
      } else {
        remote.create(T::TABLE, &record).await
      }
    }
  }
}
