// ── Write gate ──
//
// Holds the write-enable flag and validates write requests against the
// catalog before anything reaches the device.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use crate::catalog::{Catalog, ParameterDescriptor};
use crate::error::{CoreError, WriteRejection};
use crate::value::ParamValue;

/// A write that passed every check, ready for the session.
#[derive(Debug, Clone)]
pub struct ApprovedWrite {
    pub descriptor: ParameterDescriptor,
    pub raw: i64,
}

#[derive(Debug)]
pub struct WriteGate {
    /// Runtime flag, flipped only by an explicit confirmation.
    enabled: AtomicBool,
    /// Whether the active configuration allows the flag to be set.
    permitted: AtomicBool,
}

impl WriteGate {
    /// New gate with writes disabled.
    pub fn new(permitted: bool) -> Self {
        Self {
            enabled: AtomicBool::new(false),
            permitted: AtomicBool::new(permitted),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn is_permitted(&self) -> bool {
        self.permitted.load(Ordering::SeqCst)
    }

    /// Turn writes on or off. Turning them on requires permission.
    pub fn set_enabled(&self, enabled: bool) -> Result<(), CoreError> {
        if enabled && !self.is_permitted() {
            return Err(CoreError::WritesNotPermitted);
        }
        let previous = self.enabled.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            info!(enabled, "write access changed");
        }
        Ok(())
    }

    /// Forget any confirmation and adopt a new permission.
    pub fn reset(&self, permitted: bool) {
        self.enabled.store(false, Ordering::SeqCst);
        self.permitted.store(permitted, Ordering::SeqCst);
    }

    pub fn ensure_enabled(&self) -> Result<(), WriteRejection> {
        if self.is_enabled() {
            Ok(())
        } else {
            Err(WriteRejection::WriteBlocked)
        }
    }

    /// Full check: flag, then identifier, then capability, then value.
    pub fn check(
        &self,
        catalog: &Catalog,
        id: &str,
        value: &ParamValue,
    ) -> Result<ApprovedWrite, WriteRejection> {
        self.ensure_enabled()?;
        validate(catalog, id, value)
    }
}

/// Identifier, capability and value checks, without the flag.
pub fn validate(
    catalog: &Catalog,
    id: &str,
    value: &ParamValue,
) -> Result<ApprovedWrite, WriteRejection> {
    let descriptor = catalog
        .get(id)
        .ok_or_else(|| WriteRejection::UnknownParameter { id: id.to_owned() })?;
    if !descriptor.is_writable() {
        return Err(WriteRejection::NotWritable { id: id.to_owned() });
    }
    descriptor.validate(value)?;
    let raw = descriptor.encode_value(value)?;
    Ok(ApprovedWrite {
        descriptor: descriptor.clone(),
        raw,
    })
}
