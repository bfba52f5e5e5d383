mod sled_kv_store;

pub use sled_kv_store::*;


use crate::Error;
use crate::StorageConfig;

#[doc(hidden)]
pub fn init_sled_kv_db(config: &StorageConfig) -> Result<sled::Db, Error> {
    tracing::debug!("init_sled_kv_db from path: {:?}", &config.db_path);

    let kv_db_path = config.db_path.join("kv");

    sled::Config::default()
        .path(&kv_db_path)
        .cache_capacity(config.cache_capacity)
        .flush_every_ms(Some(config.flush_every_ms))
        .use_compression(true)
        .compression_factor(1)
        .open()
        .map_err(|e| {
            tracing::warn!(
                "Try to open DB at this location: {:?} and failed: {:?}",
                kv_db_path,
                e
            );
            e.into()
        })
}
