//! sled persistence.
//!
//! Three trees hold the live state and the audit ledger. All writes go through
//! [`Store::transaction`], which spans every tree so a status change and the
//! rows recording it commit together. sled re-runs a closure that lost a
//! conflict, so closures must not have side effects outside the transaction.
use crate::asset::Asset;
use crate::config::StorageConfig;
use crate::error::{Result, WorkflowError};
use crate::movement::{self, AssetMovement};
use crate::request::AssetRequest;
use sled::Transactional;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree,
};
use std::sync::Arc;

pub const ASSETS_TREE: &str = "assets";
pub const MOVEMENTS_TREE: &str = "movements";
pub const REQUESTS_TREE: &str = "requests";

pub type TxResult<T> = ConflictableTransactionResult<T, WorkflowError>;

pub fn abort<T>(err: impl Into<WorkflowError>) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(err.into()))
}

pub fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>> {
    minicbor::to_vec(value).map_err(|e| WorkflowError::Codec(e.to_string()))
}

pub fn decode<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    minicbor::decode(bytes).map_err(|e| WorkflowError::Codec(e.to_string()))
}

#[derive(Clone)]
pub struct Store {
    instance: Arc<sled::Db>,
    assets: sled::Tree,
    movements: sled::Tree,
    requests: sled::Tree,
}

impl Store {
    pub fn new(instance: Arc<sled::Db>) -> Result<Self> {
        let assets = instance.open_tree(ASSETS_TREE)?;
        let movements = instance.open_tree(MOVEMENTS_TREE)?;
        let requests = instance.open_tree(REQUESTS_TREE)?;
        Ok(Self {
            instance,
            assets,
            movements,
            requests,
        })
    }

    pub fn open(config: &StorageConfig) -> Result<Self> {
        let db = sled::open(&config.path)?;
        Self::new(Arc::new(db))
    }

    /// Runs `f` atomically across all trees
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: Fn(&Tx<'_>) -> TxResult<T>,
    {
        let result = (&self.assets, &self.movements, &self.requests).transaction(
            |(assets, movements, requests)| {
                let tx = Tx {
                    assets,
                    movements,
                    requests,
                };
                f(&tx)
            },
        )?;
        Ok(result)
    }

    pub fn flush(&self) -> Result<()> {
        self.instance.flush()?;
        Ok(())
    }

    pub fn asset(&self, tag: &str) -> Result<Option<Asset>> {
        self.assets
            .get(tag.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    pub fn request(&self, request_id: &str) -> Result<Option<AssetRequest>> {
        self.requests
            .get(request_id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    pub fn assets(&self) -> Result<Vec<Asset>> {
        self.assets
            .iter()
            .values()
            .map(|bytes| decode(&bytes?))
            .collect()
    }

    pub fn requests(&self) -> Result<Vec<AssetRequest>> {
        self.requests
            .iter()
            .values()
            .map(|bytes| decode(&bytes?))
            .collect()
    }

    /// One asset's ledger in append order
    pub fn movements(&self, tag: &str) -> Result<Vec<AssetMovement>> {
        self.movements
            .scan_prefix(movement::ledger_prefix(tag).as_bytes())
            .values()
            .map(|bytes| decode(&bytes?))
            .collect()
    }

    pub fn all_movements(&self) -> Result<Vec<AssetMovement>> {
        self.movements
            .iter()
            .values()
            .map(|bytes| decode(&bytes?))
            .collect()
    }
}

/// Typed view over the trees inside one transaction
pub struct Tx<'a> {
    assets: &'a TransactionalTree,
    movements: &'a TransactionalTree,
    requests: &'a TransactionalTree,
}

impl Tx<'_> {
    pub fn asset(&self, tag: &str) -> TxResult<Option<Asset>> {
        match self.assets.get(tag.as_bytes())? {
            Some(bytes) => decode(&bytes).map(Some).or_else(abort),
            None => Ok(None),
        }
    }

    pub fn require_asset(&self, tag: &str) -> TxResult<Asset> {
        match self.asset(tag)? {
            Some(asset) => Ok(asset),
            None => abort(WorkflowError::NotFound {
                kind: "asset",
                id: tag.to_string(),
            }),
        }
    }

    pub fn put_asset(&self, asset: &Asset) -> TxResult<()> {
        let bytes = encode(asset).or_else(abort)?;
        self.assets.insert(asset.tag.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn require_request(&self, request_id: &str) -> TxResult<AssetRequest> {
        match self.requests.get(request_id.as_bytes())? {
            Some(bytes) => decode(&bytes).or_else(abort),
            None => abort(WorkflowError::NotFound {
                kind: "request",
                id: request_id.to_string(),
            }),
        }
    }

    pub fn put_request(&self, request: &AssetRequest) -> TxResult<()> {
        let bytes = encode(request).or_else(abort)?;
        self.requests
            .insert(request.request_number.as_bytes(), bytes)?;
        Ok(())
    }

    /// Appends the movement and writes the asset it belongs to
    pub fn commit_movement(
        &self,
        asset: &mut Asset,
        movement: AssetMovement,
    ) -> TxResult<AssetMovement> {
        let recorded = movement::record(self.movements, asset, movement)?;
        self.put_asset(asset)?;
        Ok(recorded)
    }
}
