//! Field name to field number mapping.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TesseraError};

/// Largest field number a term-vector chunk can record.
pub const MAX_FIELD_NUMBER: u32 = (1 << 31) - 1;

/// Identity of one field within a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    /// Field name.
    pub name: String,

    /// Dense per-segment number assigned on first use.
    pub number: u32,
}

impl FieldInfo {
    pub fn new<S: Into<String>>(name: S, number: u32) -> Self {
        FieldInfo {
            name: name.into(),
            number,
        }
    }
}

/// All fields known to a segment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<FieldInfo>", into = "Vec<FieldInfo>")]
pub struct FieldInfos {
    by_number: Vec<Option<FieldInfo>>,
    by_name: AHashMap<String, u32>,
}

impl FieldInfos {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from explicit infos. Names and numbers must be unique.
    pub fn from_infos(infos: Vec<FieldInfo>) -> Result<Self> {
        let mut field_infos = FieldInfos::new();
        for info in infos {
            field_infos.insert(info)?;
        }
        Ok(field_infos)
    }

    fn insert(&mut self, info: FieldInfo) -> Result<()> {
        if info.number > MAX_FIELD_NUMBER {
            return Err(TesseraError::invalid_argument(format!(
                "field number {} exceeds {MAX_FIELD_NUMBER}",
                info.number
            )));
        }
        if self.by_name.contains_key(&info.name) {
            return Err(TesseraError::invalid_argument(format!(
                "duplicate field name {:?}",
                info.name
            )));
        }

        let slot = info.number as usize;
        if slot >= self.by_number.len() {
            self.by_number.resize(slot + 1, None);
        }
        if self.by_number[slot].is_some() {
            return Err(TesseraError::invalid_argument(format!(
                "duplicate field number {}",
                info.number
            )));
        }

        self.by_name.insert(info.name.clone(), info.number);
        self.by_number[slot] = Some(info);
        Ok(())
    }

    /// Look up `name`, assigning the next free number if it is new.
    pub fn add_or_get(&mut self, name: &str) -> Result<&FieldInfo> {
        let number = match self.by_name.get(name) {
            Some(&number) => number,
            None => {
                let number = self.by_number.len() as u32;
                self.insert(FieldInfo::new(name, number))?;
                number
            }
        };
        self.field_info(number)
            .ok_or_else(|| TesseraError::other(format!("field {name:?} vanished")))
    }

    pub fn field_info(&self, number: u32) -> Option<&FieldInfo> {
        self.by_number.get(number as usize).and_then(Option::as_ref)
    }

    pub fn by_name(&self, name: &str) -> Option<&FieldInfo> {
        self.by_name
            .get(name)
            .and_then(|&number| self.field_info(number))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Infos in field number order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldInfo> {
        self.by_number.iter().flatten()
    }
}

impl From<Vec<FieldInfo>> for FieldInfos {
    fn from(infos: Vec<FieldInfo>) -> Self {
        // Later duplicates are dropped; serialized infos were unique when written.
        let mut field_infos = FieldInfos::new();
        for info in infos {
            let _ = field_infos.insert(info);
        }
        field_infos
    }
}

impl From<FieldInfos> for Vec<FieldInfo> {
    fn from(field_infos: FieldInfos) -> Self {
        field_infos.by_number.into_iter().flatten().collect()
    }
}
