mod entity;
mod errors;
mod file_node;
mod mutation;
mod processing_job;
mod sample_group;
mod user_setting;
mod worker_message;

pub use entity::{EntityRecord, EntityTable, Syncable};
pub use errors::DomainError;
pub use file_node::{FileNode, FileNodeType};
pub use mutation::{EntityMutation, LocalEffect, Mutation, OperationKind, PendingOperation};
pub use processing_job::{DetailRow, DetailTable, JobKey, JobState, ProcessingJob};
pub use sample_group::SampleGroup;
pub use user_setting::UserSetting;
pub use worker_message::{ProgressEvent, WorkerRequest, WorkerResult};
