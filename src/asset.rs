//! Asset record and the registration builder
use crate::error::ValidationError;
use crate::status::AssetStatus;
use crate::types::TimeStamp;
use crate::utils;
use chrono::Utc;

/// A trackable item. Status, holder and location are only ever changed
/// together by the lifecycle engine, so they are not publicly writable.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    #[n(0)]
    pub tag: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub category: String,
    #[n(3)]
    pub brand: Option<String>,
    #[n(4)]
    pub serial_number: Option<String>,
    #[n(5)]
    pub purchase_cost: u64, // minor currency units
    #[n(6)]
    pub purchase_date: Option<TimeStamp<Utc>>,
    #[n(7)]
    pub warranty_expiry: Option<TimeStamp<Utc>>,
    #[n(8)]
    pub(crate) status: AssetStatus,
    #[n(9)]
    pub(crate) current_holder: Option<String>,
    #[n(10)]
    pub(crate) current_location: Option<String>,
    #[n(11)]
    pub(crate) prior_holder: Option<String>,
    #[n(12)]
    pub(crate) ledger_head: Option<String>, // digest of the latest movement
    #[n(13)]
    pub registered_at: TimeStamp<Utc>,
    #[n(14)]
    pub(crate) updated_at: TimeStamp<Utc>,
    #[n(15)]
    pub(crate) movement_count: u64,
}

impl Asset {
    pub fn status(&self) -> AssetStatus {
        self.status
    }
    pub fn current_holder(&self) -> Option<&str> {
        self.current_holder.as_deref()
    }
    pub fn current_location(&self) -> Option<&str> {
        self.current_location.as_deref()
    }
    /// Who held the asset before it went to repair or was lost
    pub fn prior_holder(&self) -> Option<&str> {
        self.prior_holder.as_deref()
    }
    pub fn ledger_head(&self) -> Option<&str> {
        self.ledger_head.as_deref()
    }
    pub fn movement_count(&self) -> u64 {
        self.movement_count
    }
    pub fn updated_at(&self) -> &TimeStamp<Utc> {
        &self.updated_at
    }
    /// `Assigned` if and only if a holder is present
    pub fn is_consistent(&self) -> bool {
        self.status.requires_holder() == self.current_holder.is_some()
    }
}

// used for registering new assets
#[derive(Debug, Default, Clone)]
pub struct AssetDetails {
    tag: Option<String>,
    name: Option<String>,
    category: Option<String>,
    brand: Option<String>,
    serial_number: Option<String>,
    purchase_cost: u64,
    purchase_date: Option<TimeStamp<Utc>>,
    warranty_expiry: Option<TimeStamp<Utc>>,
    location: Option<String>,
}

impl AssetDetails {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_tag(mut self, tag: &str) -> Self {
        self.tag = Some(tag.trim().to_string());
        self
    }
    pub fn set_name(mut self, name: &str) -> Self {
        self.name = Some(name.trim().to_string());
        self
    }
    pub fn set_category(mut self, category: &str) -> Self {
        self.category = Some(category.trim().to_lowercase());
        self
    }
    pub fn set_brand(mut self, brand: &str) -> Self {
        self.brand = Some(brand.to_string());
        self
    }
    pub fn set_serial_number(mut self, serial: &str) -> Self {
        self.serial_number = Some(serial.to_string());
        self
    }
    pub fn set_purchase_cost(mut self, cost: u64) -> Self {
        self.purchase_cost = cost;
        self
    }
    pub fn set_purchase_date(mut self, date: TimeStamp<Utc>) -> Self {
        self.purchase_date = Some(date);
        self
    }
    pub fn set_warranty_expiry(mut self, date: TimeStamp<Utc>) -> Self {
        self.warranty_expiry = Some(date);
        self
    }
    pub fn set_location(mut self, location: &str) -> Self {
        self.location = Some(location.to_string());
        self
    }
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }
    // warranty cannot run out before the asset was bought
    pub fn validate_dates(&self) -> bool {
        match (&self.purchase_date, &self.warranty_expiry) {
            (Some(purchased), Some(expiry)) => purchased <= expiry,
            _ => true,
        }
    }
    /// Checks fields and produces an `InStock` asset
    pub fn validate_and_finalise(self) -> Result<Asset, ValidationError> {
        if !self.validate_dates() {
            return Err(ValidationError::WarrantyBeforePurchase);
        }
        let tag = non_empty(self.tag, "tag")?;
        if !utils::is_valid_tag(&tag) {
            return Err(ValidationError::InvalidTag(tag));
        }
        let name = non_empty(self.name, "name")?;
        let category = non_empty(self.category, "category")?;

        let now = TimeStamp::new();
        Ok(Asset {
            tag,
            name,
            category,
            brand: self.brand,
            serial_number: self.serial_number,
            purchase_cost: self.purchase_cost,
            purchase_date: self.purchase_date,
            warranty_expiry: self.warranty_expiry,
            status: AssetStatus::InStock,
            current_holder: None,
            current_location: self.location,
            prior_holder: None,
            ledger_head: None,
            registered_at: now.clone(),
            updated_at: now,
            movement_count: 0,
        })
    }
}

fn non_empty(value: Option<String>, field: &'static str) -> Result<String, ValidationError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ValidationError::MissingField(field)),
    }
}
