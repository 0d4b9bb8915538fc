pub(crate) use whalewatch_domain::storage::StorageError;
