// Licensed under the Apache-2.0 license

//! Platform Descriptor Record repository.
//!
//! An insertion-ordered store of variable-length, type-tagged records.
//! Every record's payload begins with the common PDR header from
//! DSP0248: `(record_handle: u32, version: u8, type: u8,
//! record_change_number: u16, length: u16)`; the repository patches the
//! first four bytes with the assigned handle so the header embedded in
//! the payload and the handle tracked by the repository never diverge.

use alloc::vec::Vec;

use crate::error::PldmError;
use crate::msgbuf::MsgBuf;

pub const PDR_HEADER_LEN: usize = 10;

/// Well-known PDR type codes from DSP0248 Table "PDR Type".
pub mod pdr_type {
    pub const TERMINUS_LOCATOR: u8 = 1;
    pub const STATE_SENSOR: u8 = 4;
    pub const STATE_EFFECTER: u8 = 11;
    pub const ENTITY_ASSOCIATION: u8 = 15;
    pub const FRU_RECORD_SET: u8 = 20;
}

/// Two-byte WILDCARD a caller passes for "allocate the next free
/// instance number" or "allocate the next free record handle".
pub const WILDCARD_U16: u16 = 0xffff;

#[derive(Debug, Clone)]
pub struct PdrRecord {
    record_handle: u32,
    terminus_handle: u16,
    is_remote: bool,
    data: Vec<u8>,
}

impl PdrRecord {
    pub fn record_handle(&self) -> u32 {
        self.record_handle
    }

    pub fn terminus_handle(&self) -> u16 {
        self.terminus_handle
    }

    pub fn is_remote(&self) -> bool {
        self.is_remote
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pdr_type(&self) -> Option<u8> {
        self.data.get(5).copied()
    }

    fn body(&self) -> &[u8] {
        &self.data[PDR_HEADER_LEN.min(self.data.len())..]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FruRecordSetInfo {
    pub terminus_handle: u16,
    pub entity_type: u16,
    pub entity_instance_num: u16,
    pub container_id: u16,
}

/// A single insertion-ordered PDR store.
///
/// Record pointers are not exposed directly; every lookup returns a
/// borrow whose lifetime is tied to `&self`, so the borrow checker
/// enforces the "invalidated by the next mutation" rule that the
/// opaque C handles only documented.
pub struct PdrRepo {
    records: Vec<PdrRecord>,
}

impl Default for PdrRepo {
    fn default() -> Self {
        Self::init()
    }
}

impl PdrRepo {
    pub fn init() -> Self {
        PdrRepo {
            records: Vec::new(),
        }
    }

    pub fn get_record_count(&self) -> u32 {
        self.records.len() as u32
    }

    pub fn get_repo_size(&self) -> u32 {
        self.records.iter().map(|r| r.data.len() as u32).sum()
    }

    fn max_handle(&self) -> u32 {
        self.records.iter().map(|r| r.record_handle).max().unwrap_or(0)
    }

    fn index_of(&self, handle: u32) -> Option<usize> {
        self.records.iter().position(|r| r.record_handle == handle)
    }

    /// Copies `data` into repository-owned storage, assigning or
    /// validating a record handle and patching it into the payload's
    /// embedded header.
    pub fn add(
        &mut self,
        data: &[u8],
        is_remote: bool,
        terminus_handle: u16,
        in_out_handle: &mut u32,
    ) -> Result<(), PldmError> {
        if data.len() < PDR_HEADER_LEN {
            return Err(PldmError::InvalidLength);
        }
        let handle = if *in_out_handle == 0 {
            self.max_handle() + 1
        } else {
            if self.index_of(*in_out_handle).is_some() {
                return Err(PldmError::AlreadyExists);
            }
            *in_out_handle
        };

        let mut owned = data.to_vec();
        owned[0..4].copy_from_slice(&handle.to_le_bytes());

        self.records.push(PdrRecord {
            record_handle: handle,
            terminus_handle,
            is_remote,
            data: owned,
        });
        *in_out_handle = handle;
        Ok(())
    }

    /// Linear scan by record handle. Handle `0` returns the first
    /// record. Returns the record together with the handle of the
    /// record that follows it (`0` at the end).
    pub fn find_record(&self, handle: u32) -> Option<(&PdrRecord, u32)> {
        let idx = if handle == 0 {
            0
        } else {
            self.index_of(handle)?
        };
        let record = self.records.get(idx)?;
        let next = self.records.get(idx + 1).map(|r| r.record_handle).unwrap_or(0);
        Some((record, next))
    }

    pub fn get_next_record(&self, current_handle: u32) -> Option<(&PdrRecord, u32)> {
        let idx = self.index_of(current_handle)?;
        let record = self.records.get(idx + 1)?;
        let next = self
            .records
            .get(idx + 2)
            .map(|r| r.record_handle)
            .unwrap_or(0);
        Some((record, next))
    }

    pub fn find_record_by_type(&self, pdr_type: u8, start_after: Option<u32>) -> Option<&PdrRecord> {
        let start_idx = match start_after {
            Some(h) => self.index_of(h)? + 1,
            None => 0,
        };
        self.records[start_idx..]
            .iter()
            .find(|r| r.pdr_type() == Some(pdr_type))
    }

    pub fn find_last_in_range(&self, lo: u32, hi: u32) -> Option<&PdrRecord> {
        self.records
            .iter()
            .filter(|r| r.record_handle >= lo && r.record_handle <= hi)
            .max_by_key(|r| r.record_handle)
    }

    pub fn fru_record_set_find_by_rsi(&self, fru_rsi: u16) -> Option<FruRecordSetInfo> {
        for record in &self.records {
            if record.pdr_type() != Some(pdr_type::FRU_RECORD_SET) {
                continue;
            }
            let body = record.body();
            let mut mb = match MsgBuf::new(body, 10) {
                Ok(mb) => mb,
                Err(_) => continue,
            };
            let terminus_handle = mb.extract_u16().ok()?;
            let rsi = mb.extract_u16().ok()?;
            let entity_type = mb.extract_u16().ok()?;
            let entity_instance_num = mb.extract_u16().ok()?;
            let container_id = mb.extract_u16().ok()?;
            if rsi == fru_rsi {
                return Some(FruRecordSetInfo {
                    terminus_handle,
                    entity_type,
                    entity_instance_num,
                    container_id,
                });
            }
        }
        None
    }

    pub fn delete_by_record_handle(&mut self, handle: u32, is_remote: bool) -> Result<(), PldmError> {
        let idx = self.index_of(handle).ok_or(PldmError::NotFound)?;
        if self.records[idx].is_remote != is_remote {
            return Err(PldmError::NotFound);
        }
        self.records.remove(idx);
        Ok(())
    }

    fn delete_by_embedded_id(
        &mut self,
        want_type: u8,
        id: u16,
        is_remote: bool,
    ) -> Result<Option<u32>, PldmError> {
        let mut found_idx = None;
        for (idx, record) in self.records.iter().enumerate() {
            if record.pdr_type() != Some(want_type) || record.is_remote != is_remote {
                continue;
            }
            let body = record.body();
            let mut mb = MsgBuf::new(body, 4).map_err(PldmError::from)?;
            let _terminus_handle = mb.extract_u16().map_err(PldmError::from)?;
            let embedded_id = mb.extract_u16().map_err(PldmError::from)?;
            if embedded_id == id {
                found_idx = Some(idx);
                break;
            }
        }
        Ok(found_idx.map(|idx| {
            let handle = self.records[idx].record_handle;
            self.records.remove(idx);
            handle
        }))
    }

    pub fn delete_by_sensor_id(&mut self, sensor_id: u16, is_remote: bool) -> Result<Option<u32>, PldmError> {
        self.delete_by_embedded_id(pdr_type::STATE_SENSOR, sensor_id, is_remote)
    }

    pub fn delete_by_effecter_id(
        &mut self,
        effecter_id: u16,
        is_remote: bool,
    ) -> Result<Option<u32>, PldmError> {
        self.delete_by_embedded_id(pdr_type::STATE_EFFECTER, effecter_id, is_remote)
    }

    /// Scans entity-association PDRs outside `[exclude_lo, exclude_hi]`
    /// for a `(entity_type, entity_instance)` parent and returns the
    /// container ID of its `child_index`-th child.
    pub fn find_child_container_id_index_range_exclude(
        &self,
        entity_type: u16,
        entity_instance: u16,
        child_index: u8,
        exclude_lo: u32,
        exclude_hi: u32,
    ) -> Result<u16, PldmError> {
        for record in &self.records {
            if record.pdr_type() != Some(pdr_type::ENTITY_ASSOCIATION) {
                continue;
            }
            if record.record_handle >= exclude_lo && record.record_handle <= exclude_hi {
                continue;
            }
            let body = record.body();
            let mut mb = MsgBuf::new(body, 10).map_err(PldmError::from)?;
            let _container_id = mb.extract_u16().map_err(PldmError::from)?;
            let _association_type = mb.extract_u8().map_err(PldmError::from)?;
            let parent_type = mb.extract_u16().map_err(PldmError::from)?;
            let parent_instance = mb.extract_u16().map_err(PldmError::from)?;
            let _parent_container_id = mb.extract_u16().map_err(PldmError::from)?;
            let num_children = mb.extract_u8().map_err(PldmError::from)?;
            if parent_type != entity_type || parent_instance != entity_instance {
                continue;
            }
            if child_index >= num_children {
                continue;
            }
            for i in 0..num_children {
                let _child_type = mb.extract_u16().map_err(PldmError::from)?;
                let _child_instance = mb.extract_u16().map_err(PldmError::from)?;
                let child_container_id = mb.extract_u16().map_err(PldmError::from)?;
                if i == child_index {
                    return Ok(child_container_id);
                }
            }
        }
        Err(PldmError::NotFound)
    }

    pub fn remove_pdrs_by_terminus_handle(&mut self, terminus_handle: u16) {
        self.records
            .retain(|r| !(r.is_remote && r.terminus_handle == terminus_handle));
    }

    pub fn remove_remote_pdrs(&mut self) {
        self.records.retain(|r| !r.is_remote);
    }

    /// Mutable access to a record's raw payload, for in-place PDR
    /// growth/shrink (association-PDR child append/remove).
    pub fn record_data_mut(&mut self, handle: u32) -> Result<&mut Vec<u8>, PldmError> {
        let idx = self.index_of(handle).ok_or(PldmError::NotFound)?;
        Ok(&mut self.records[idx].data)
    }

    /// Inserts a new record directly after `after_handle`, assigning it
    /// handle `after_handle + 1`. Used by
    /// `association_pdr_create_new` to splice a record into the middle
    /// of the insertion order rather than appending at the end.
    pub fn insert_after(
        &mut self,
        after_handle: u32,
        mut data: Vec<u8>,
        terminus_handle: u16,
        is_remote: bool,
    ) -> Result<u32, PldmError> {
        let idx = self.index_of(after_handle).ok_or(PldmError::NotFound)?;
        let new_handle = after_handle + 1;
        if self.index_of(new_handle).is_some() {
            return Err(PldmError::AlreadyExists);
        }
        if data.len() < PDR_HEADER_LEN {
            return Err(PldmError::InvalidLength);
        }
        data[0..4].copy_from_slice(&new_handle.to_le_bytes());
        self.records.insert(
            idx + 1,
            PdrRecord {
                record_handle: new_handle,
                terminus_handle,
                is_remote,
                data,
            },
        );
        Ok(new_handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor_pdr_body(terminus_handle: u16, sensor_id: u16) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&terminus_handle.to_le_bytes());
        body.extend_from_slice(&sensor_id.to_le_bytes());
        body
    }

    fn make_pdr(pdr_type: u8, body: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&0u32.to_le_bytes()); // record_handle, patched on add
        data.push(1); // version
        data.push(pdr_type);
        data.extend_from_slice(&0u16.to_le_bytes()); // record_change_number
        data.extend_from_slice(&(body.len() as u16).to_le_bytes());
        data.extend_from_slice(body);
        data
    }

    #[test]
    fn add_assigns_next_handle_and_rejects_duplicates() {
        let mut repo = PdrRepo::init();
        let pdr = make_pdr(pdr_type::STATE_SENSOR, &sensor_pdr_body(1, 50));

        let mut handle = 0u32;
        repo.add(&pdr, false, 1, &mut handle).unwrap();
        assert_eq!(handle, 1);

        let mut handle2 = 0u32;
        repo.add(&pdr, false, 1, &mut handle2).unwrap();
        assert_eq!(handle2, 2);

        let mut dup = 1u32;
        assert_eq!(
            repo.add(&pdr, false, 1, &mut dup),
            Err(PldmError::AlreadyExists)
        );
        assert_eq!(repo.get_record_count(), 2);
    }

    #[test]
    fn find_record_walks_in_insertion_order() {
        let mut repo = PdrRepo::init();
        for sensor_id in [10u16, 20, 30] {
            let pdr = make_pdr(pdr_type::STATE_SENSOR, &sensor_pdr_body(1, sensor_id));
            let mut handle = 0u32;
            repo.add(&pdr, false, 1, &mut handle).unwrap();
        }
        let (first, next) = repo.find_record(0).unwrap();
        assert_eq!(first.record_handle(), 1);
        assert_eq!(next, 2);
        let (_, next) = repo.find_record(next).unwrap();
        assert_eq!(next, 3);
        let (_, next) = repo.find_record(next).unwrap();
        assert_eq!(next, 0);
    }

    #[test]
    fn delete_by_sensor_id_surfaces_decode_error_on_malformed_record() {
        let mut repo = PdrRepo::init();
        let malformed = make_pdr(pdr_type::STATE_SENSOR, &[0u8; 1]);
        let mut handle = 0u32;
        repo.add(&malformed, false, 1, &mut handle).unwrap();

        let result = repo.delete_by_sensor_id(50, false);
        assert!(result.is_err());
        assert_eq!(repo.get_record_count(), 1);
    }

    #[test]
    fn remove_remote_pdrs_only_drops_remote_records() {
        let mut repo = PdrRepo::init();
        let pdr = make_pdr(pdr_type::STATE_SENSOR, &sensor_pdr_body(1, 1));
        let mut h1 = 0u32;
        repo.add(&pdr, false, 1, &mut h1).unwrap();
        let mut h2 = 0u32;
        repo.add(&pdr, true, 2, &mut h2).unwrap();

        repo.remove_remote_pdrs();
        assert_eq!(repo.get_record_count(), 1);
        assert!(!repo.find_record(0).unwrap().0.is_remote());
    }
}
