//! File-descriptor table.
//!
//! A dense, fixed-capacity array. Allocation always scans from zero for the
//! first hole, so the lowest free descriptor wins; guests rely on that
//! after closing stdin. The cloexec bit lives in the slot, not the file:
//! two descriptors over the same file may disagree about it.

use std::sync::Arc;

use linden_abi::MAX_FD_COUNT;

use crate::error::{VfsError, VfsResult};
use crate::file::GuestFile;

struct FdSlot {
    file: Arc<dyn GuestFile>,
    cloexec: bool,
}

pub struct FdTable {
    slots: Vec<Option<FdSlot>>,
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FdTable {
    pub fn new() -> Self {
        let mut slots = Vec::new();
        slots.resize_with(MAX_FD_COUNT, || None);
        Self { slots }
    }

    /// Park a file in the first free slot, taking over the caller's
    /// reference.
    pub fn store(&mut self, file: Arc<dyn GuestFile>, cloexec: bool) -> VfsResult<i32> {
        match self.slots.iter().position(Option::is_none) {
            Some(fd) => {
                self.slots[fd] = Some(FdSlot { file, cloexec });
                Ok(fd as i32)
            }
            None => Err(VfsError::TooManyOpenFiles),
        }
    }

    /// Install a file at an exact slot, closing any prior occupant. Used by
    /// init to pin stdio descriptors.
    pub fn install(&mut self, fd: i32, file: Arc<dyn GuestFile>, cloexec: bool) {
        let slot = &mut self.slots[fd as usize];
        *slot = Some(FdSlot { file, cloexec });
    }

    pub fn get(&self, fd: i32) -> Option<Arc<dyn GuestFile>> {
        self.slot(fd).map(|s| s.file.clone())
    }

    pub fn cloexec(&self, fd: i32) -> Option<bool> {
        self.slot(fd).map(|s| s.cloexec)
    }

    /// Returns false for a dead descriptor.
    pub fn set_cloexec(&mut self, fd: i32, cloexec: bool) -> bool {
        match self.slot_mut(fd) {
            Some(slot) => {
                slot.cloexec = cloexec;
                true
            }
            None => false,
        }
    }

    /// Drop one reference and clear the slot. The file itself closes when
    /// the last reference goes away.
    pub fn close(&mut self, fd: i32) -> VfsResult<()> {
        if !(0..MAX_FD_COUNT as i32).contains(&fd) {
            return Err(VfsError::BadHandle);
        }
        match self.slots[fd as usize].take() {
            Some(_) => Ok(()),
            None => Err(VfsError::BadHandle),
        }
    }

    /// `dup`/`dup2`/`dup3`. `newfd == None` allocates the first free slot;
    /// an explicit target evicts its prior occupant and may not equal `fd`.
    pub fn dup(&mut self, fd: i32, newfd: Option<i32>, cloexec: bool) -> VfsResult<i32> {
        let file = self.get(fd).ok_or(VfsError::BadHandle)?;
        match newfd {
            None => self.store(file, cloexec),
            Some(newfd) => {
                if newfd == fd || !(0..MAX_FD_COUNT as i32).contains(&newfd) {
                    return Err(VfsError::InvalidInput);
                }
                self.slots[newfd as usize] = Some(FdSlot { file, cloexec });
                Ok(newfd)
            }
        }
    }

    /// Close every descriptor marked close-on-exec.
    pub fn reset_on_exec(&mut self) {
        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(|s| s.cloexec) {
                *slot = None;
            }
        }
    }

    /// Close everything.
    pub fn shutdown(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, Arc<dyn GuestFile>)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(fd, slot)| slot.as_ref().map(|s| (fd as i32, s.file.clone())))
    }

    fn slot(&self, fd: i32) -> Option<&FdSlot> {
        if !(0..MAX_FD_COUNT as i32).contains(&fd) {
            return None;
        }
        self.slots[fd as usize].as_ref()
    }

    fn slot_mut(&mut self, fd: i32) -> Option<&mut FdSlot> {
        if !(0..MAX_FD_COUNT as i32).contains(&fd) {
            return None;
        }
        self.slots[fd as usize].as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linden_abi::OpenFlags;

    struct Probe;

    impl GuestFile for Probe {
        fn flags(&self) -> OpenFlags {
            OpenFlags::empty()
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    fn file() -> Arc<dyn GuestFile> {
        Arc::new(Probe)
    }

    #[test]
    fn store_scans_from_zero() {
        let mut t = FdTable::new();
        assert_eq!(t.store(file(), false).unwrap(), 0);
        assert_eq!(t.store(file(), false).unwrap(), 1);
        t.close(0).unwrap();
        assert_eq!(t.store(file(), false).unwrap(), 0);
    }

    #[test]
    fn refcount_tracks_slots_and_borrows() {
        let mut t = FdTable::new();
        let f = file();
        let fd = t.store(f.clone(), false).unwrap();
        // one for `f`, one for the slot
        assert_eq!(Arc::strong_count(&f), 2);
        let dup = t.dup(fd, None, false).unwrap();
        assert_eq!(Arc::strong_count(&f), 3);
        let borrowed = t.get(fd).unwrap();
        assert_eq!(Arc::strong_count(&f), 4);
        drop(borrowed);
        t.close(dup).unwrap();
        t.close(fd).unwrap();
        assert_eq!(Arc::strong_count(&f), 1);
    }

    #[test]
    fn dup_rejects_self_and_out_of_range() {
        let mut t = FdTable::new();
        let fd = t.store(file(), false).unwrap();
        assert_eq!(t.dup(fd, Some(fd), false).unwrap_err(), VfsError::InvalidInput);
        assert_eq!(
            t.dup(fd, Some(MAX_FD_COUNT as i32), false).unwrap_err(),
            VfsError::InvalidInput
        );
        assert_eq!(t.dup(fd, Some(-1), false).unwrap_err(), VfsError::InvalidInput);
        assert_eq!(t.dup(999_999, None, false).unwrap_err(), VfsError::BadHandle);
    }

    #[test]
    fn dup2_replaces_prior_occupant() {
        let mut t = FdTable::new();
        let a = file();
        let b = file();
        let fa = t.store(a.clone(), false).unwrap();
        let fb = t.store(b.clone(), false).unwrap();
        assert_eq!(t.dup(fa, Some(fb), false).unwrap(), fb);
        // prior occupant released, target now aliases `a`
        assert_eq!(Arc::strong_count(&b), 1);
        assert_eq!(Arc::strong_count(&a), 3);
    }

    #[test]
    fn reset_on_exec_closes_only_cloexec() {
        let mut t = FdTable::new();
        let keep = t.store(file(), false).unwrap();
        let lose = t.store(file(), true).unwrap();
        t.reset_on_exec();
        assert!(t.get(keep).is_some());
        assert!(t.get(lose).is_none());
    }

    #[test]
    fn cloexec_is_per_slot() {
        let mut t = FdTable::new();
        let fd = t.store(file(), true).unwrap();
        let dup = t.dup(fd, None, false).unwrap();
        assert_eq!(t.cloexec(fd), Some(true));
        assert_eq!(t.cloexec(dup), Some(false));
    }

    #[test]
    fn table_overflow_reports_emfile() {
        let mut t = FdTable::new();
        for _ in 0..MAX_FD_COUNT {
            t.store(file(), false).unwrap();
        }
        assert_eq!(t.store(file(), false).unwrap_err(), VfsError::TooManyOpenFiles);
    }
}
