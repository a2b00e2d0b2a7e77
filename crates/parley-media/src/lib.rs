pub mod broker;
pub mod storage;

pub use broker::{
    ConsumeResult, MediaBroker, MediaError, ProducedProducer, TransportCreated,
};
pub use storage::{LocalStorage, Storage, StorageError, StoredUpload, UploadKind};
