//! Movement recorder: the append-only audit ledger of asset changes.
//!
//! Every movement stores the digest of the movement before it for the same
//! asset, and the asset keeps the digest of its latest movement. Ledger keys
//! are `<tag>/<hex sequence>` so a prefix scan returns one asset's history in
//! the order it was written.
use crate::asset::Asset;
use crate::error::{Result, WorkflowError};
use crate::status::{AssetStatus, MovementType};
use crate::store::{self, TxResult, abort};
use crate::types::TimeStamp;
use chrono::Utc;
use sled::transaction::TransactionalTree;

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct AssetMovement {
    #[n(0)]
    pub asset_tag: String,
    #[n(1)]
    pub sequence: u64, // position in this asset's ledger
    #[n(2)]
    pub movement_type: MovementType,
    #[n(3)]
    pub from_status: Option<AssetStatus>, // None only for the registration entry
    #[n(4)]
    pub to_status: AssetStatus,
    #[n(5)]
    pub from_holder: Option<String>,
    #[n(6)]
    pub to_holder: Option<String>,
    #[n(7)]
    pub from_location: Option<String>,
    #[n(8)]
    pub to_location: Option<String>,
    #[n(9)]
    pub performed_by: String,
    #[n(10)]
    pub request_id: Option<String>,
    #[n(11)]
    pub notes: Option<String>,
    #[n(12)]
    pub recorded_at: TimeStamp<Utc>,
    #[n(13)]
    pub prev_digest: Option<String>,
}

impl AssetMovement {
    /// Returns the sha256 digest of the CBOR encoding together with the encoding
    pub fn build(&self) -> Result<(String, Vec<u8>)> {
        let cbor = store::encode(self)?;
        let hash = sha256::digest(&cbor);

        Ok((hash, cbor))
    }
    pub fn describe(&self) -> String {
        let mut line = format!(
            "#{} {} {} by {}",
            self.sequence, self.recorded_at, self.movement_type, self.performed_by
        );
        if let Some(from) = self.from_status {
            line.push_str(&format!(" [{from} -> {}]", self.to_status));
        }
        if self.from_holder != self.to_holder {
            line.push_str(&format!(
                " holder {} -> {}",
                self.from_holder.as_deref().unwrap_or("-"),
                self.to_holder.as_deref().unwrap_or("-")
            ));
        }
        if let Some(request_id) = &self.request_id {
            line.push_str(&format!(" (request {request_id})"));
        }
        line
    }
}

pub fn ledger_prefix(tag: &str) -> String {
    format!("{tag}/")
}

pub fn ledger_key(tag: &str, sequence: u64) -> String {
    format!("{tag}/{}", hex::encode(sequence.to_be_bytes()))
}

/// Appends `movement` to the asset's ledger inside the caller's transaction.
///
/// The sequence and `prev_digest` are assigned here from the asset, and the
/// asset's ledger head is advanced. The caller must write the asset back in the
/// same transaction.
pub fn record(
    movements: &TransactionalTree,
    asset: &mut Asset,
    mut movement: AssetMovement,
) -> TxResult<AssetMovement> {
    movement.sequence = asset.movement_count;
    movement.prev_digest = asset.ledger_head.clone();

    let key = ledger_key(&asset.tag, movement.sequence);
    let (digest, cbor) = match movement.build() {
        Ok(built) => built,
        Err(err) => return abort(err),
    };
    // never overwrite an existing entry
    if movements.get(key.as_bytes())?.is_some() {
        return abort(WorkflowError::Codec(format!(
            "ledger entry {key} already exists"
        )));
    }
    movements.insert(key.as_bytes(), cbor)?;

    asset.ledger_head = Some(digest);
    asset.movement_count += 1;

    Ok(movement)
}

/// Result of re-walking a ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerReport {
    pub entries: usize,
    pub intact: bool,
    pub first_break: Option<u64>, // sequence of the first entry that does not chain
}

/// Recomputes the digest chain of one asset's movements against its head
pub fn verify_chain(head: Option<&str>, movements: &[AssetMovement]) -> Result<LedgerReport> {
    let mut previous: Option<String> = None;

    for (index, movement) in movements.iter().enumerate() {
        if movement.sequence != index as u64 || movement.prev_digest != previous {
            return Ok(LedgerReport {
                entries: movements.len(),
                intact: false,
                first_break: Some(index as u64),
            });
        }
        let (digest, _) = movement.build()?;
        previous = Some(digest);
    }

    let intact = previous.as_deref() == head;
    Ok(LedgerReport {
        entries: movements.len(),
        intact,
        first_break: if intact {
            None
        } else {
            Some(movements.len() as u64)
        },
    })
}
