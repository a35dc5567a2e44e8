// Persistent key/value store on two alternating NOR flash sectors
//
// Slot layout (little endian), one slot per erase sector:
//   0..4    magic  "TNKV"
//   4..8    sequence number, bumped on every commit
//   8..12   length of the text body
//   12..16  CRC-32 of the body
//   16..    body, the `MemStore` text form, padded to the write size
//
// The whole store is cached in RAM. `commit` writes the slot that does
// not hold the current image and only when something changed, so an
// interrupted commit leaves the previous image intact. On open the valid
// slot with the newest sequence wins; blank, foreign or damaged slots
// are skipped.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use embedded_storage::nor_flash::NorFlash;

use crate::store::{KvStore, MemStore, StoreError};

/// NVS partition offset in the default ESP-IDF partition table. The
/// store occupies two sectors from here.
pub const STORE_OFFSET: u32 = 0x9000;

const MAGIC: [u8; 4] = *b"TNKV";
const HEADER_LEN: usize = 16;
const SLOTS: u32 = 2;
const ERASED: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    index: u32,
    seq: u32,
}

pub struct FlashStore<F> {
    flash: F,
    offset: u32,
    active: Option<Slot>,
    cache: MemStore,
    dirty: bool,
}

impl<F: NorFlash> FlashStore<F> {
    /// Load the store at `offset`, which must be sector aligned.
    pub fn open(mut flash: F, offset: u32) -> Result<Self, StoreError> {
        if offset as usize % F::ERASE_SIZE != 0 {
            return Err(StoreError::Io);
        }
        let mut newest: Option<(Slot, String)> = None;
        for index in 0..SLOTS {
            match read_slot(&mut flash, slot_address::<F>(offset, index)) {
                Ok(Some((seq, text))) => {
                    if newest.as_ref().is_none_or(|(s, _)| is_newer(seq, s.seq)) {
                        newest = Some((Slot { index, seq }, text));
                    }
                }
                Ok(None) => {}
                Err(StoreError::Corrupt) => log::warn!("store: slot {} corrupt, skipped", index),
                Err(e) => return Err(e),
            }
        }
        let (active, cache) = match newest {
            Some((slot, text)) => (Some(slot), MemStore::from_txt(&text)),
            None => (None, MemStore::new()),
        };
        log::info!("store: {} entries loaded from flash", cache.len());
        Ok(Self {
            flash,
            offset,
            active,
            cache,
            dirty: false,
        })
    }

    pub fn cache(&self) -> &MemStore {
        &self.cache
    }

    pub fn into_flash(self) -> F {
        self.flash
    }

    fn capacity() -> usize {
        F::ERASE_SIZE - HEADER_LEN
    }
}

fn slot_address<F: NorFlash>(offset: u32, index: u32) -> u32 {
    offset + index * F::ERASE_SIZE as u32
}

/// Sequence order that survives wrapping.
fn is_newer(seq: u32, than: u32) -> bool {
    (seq.wrapping_sub(than) as i32) > 0
}

/// CRC-32 (IEEE, reflected).
fn crc32(data: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &b in data {
        crc ^= b as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

fn word(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// `Ok(None)` for a blank or foreign slot, otherwise its sequence
/// number and body.
fn read_slot<F: NorFlash>(flash: &mut F, addr: u32) -> Result<Option<(u32, String)>, StoreError> {
    let mut header = [0u8; HEADER_LEN];
    flash.read(addr, &mut header).map_err(|_| StoreError::Io)?;
    if header[..4] != MAGIC {
        return Ok(None);
    }
    let seq = word(&header, 4);
    let len = word(&header, 8) as usize;
    if len > F::ERASE_SIZE - HEADER_LEN {
        log::warn!("store: header length {} out of range", len);
        return Err(StoreError::Corrupt);
    }
    let mut body = vec![0u8; align_up(len, F::READ_SIZE)];
    flash
        .read(addr + HEADER_LEN as u32, &mut body)
        .map_err(|_| StoreError::Io)?;
    body.truncate(len);
    if crc32(&body) != word(&header, 12) {
        return Err(StoreError::Corrupt);
    }
    String::from_utf8(body)
        .map(|text| Some((seq, text)))
        .map_err(|_| StoreError::Corrupt)
}

fn align_up(n: usize, to: usize) -> usize {
    n.div_ceil(to) * to
}

impl<F: NorFlash> KvStore for FlashStore<F> {
    fn get(&self, namespace: &str, key: &str) -> Result<String, StoreError> {
        self.cache.get(namespace, key)
    }

    fn set(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), StoreError> {
        if self.cache.get(namespace, key).as_deref() == Ok(value) {
            return Ok(());
        }
        self.cache.set(namespace, key, value)?;
        self.dirty = true;
        Ok(())
    }

    fn clear(&mut self, namespace: &str) -> Result<(), StoreError> {
        let before = self.cache.len();
        self.cache.clear(namespace)?;
        self.dirty |= self.cache.len() != before;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }
        let text = self.cache.to_txt();
        if text.len() > Self::capacity() {
            return Err(StoreError::NoSpace);
        }
        let target = match self.active {
            Some(slot) => Slot {
                index: (slot.index + 1) % SLOTS,
                seq: slot.seq.wrapping_add(1),
            },
            None => Slot { index: 0, seq: 1 },
        };

        let mut image: Vec<u8> = Vec::with_capacity(HEADER_LEN + text.len());
        image.extend_from_slice(&MAGIC);
        image.extend_from_slice(&target.seq.to_le_bytes());
        image.extend_from_slice(&(text.len() as u32).to_le_bytes());
        image.extend_from_slice(&crc32(text.as_bytes()).to_le_bytes());
        image.extend_from_slice(text.as_bytes());
        image.resize(align_up(image.len(), F::WRITE_SIZE), ERASED);

        let addr = slot_address::<F>(self.offset, target.index);
        self.flash
            .erase(addr, addr + F::ERASE_SIZE as u32)
            .map_err(|_| StoreError::Io)?;
        self.flash.write(addr, &image).map_err(|_| StoreError::Io)?;
        self.active = Some(target);
        self.dirty = false;
        log::info!(
            "store: committed {} bytes to slot {} (seq {})",
            text.len(),
            target.index,
            target.seq
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::vec;
    use std::vec::Vec;

    use embedded_storage::nor_flash::{
        ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
    };

    #[derive(Debug)]
    pub struct RamFlashError(pub NorFlashErrorKind);

    impl NorFlashError for RamFlashError {
        fn kind(&self) -> NorFlashErrorKind {
            self.0
        }
    }

    /// NOR semantics in RAM: erase sets 0xFF, writes can only clear bits.
    pub struct RamFlash {
        pub mem: Vec<u8>,
        pub erases: usize,
        /// Power cut: the next write stores only this many bytes, then fails.
        pub tear_after: Option<usize>,
    }

    impl RamFlash {
        pub fn new(sectors: usize) -> Self {
            Self {
                mem: vec![0xFF; sectors * Self::ERASE_SIZE],
                erases: 0,
                tear_after: None,
            }
        }
    }

    impl ErrorType for RamFlash {
        type Error = RamFlashError;
    }

    impl ReadNorFlash for RamFlash {
        const READ_SIZE: usize = 4;

        fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
            let o = offset as usize;
            let src = self
                .mem
                .get(o..o + bytes.len())
                .ok_or(RamFlashError(NorFlashErrorKind::OutOfBounds))?;
            bytes.copy_from_slice(src);
            Ok(())
        }

        fn capacity(&self) -> usize {
            self.mem.len()
        }
    }

    impl NorFlash for RamFlash {
        const WRITE_SIZE: usize = 4;
        const ERASE_SIZE: usize = 4096;

        fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
            let (from, to) = (from as usize, to as usize);
            if from % Self::ERASE_SIZE != 0 || to % Self::ERASE_SIZE != 0 {
                return Err(RamFlashError(NorFlashErrorKind::NotAligned));
            }
            self.mem
                .get_mut(from..to)
                .ok_or(RamFlashError(NorFlashErrorKind::OutOfBounds))?
                .fill(0xFF);
            self.erases += 1;
            Ok(())
        }

        fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
            let o = offset as usize;
            if o % Self::WRITE_SIZE != 0 || bytes.len() % Self::WRITE_SIZE != 0 {
                return Err(RamFlashError(NorFlashErrorKind::NotAligned));
            }
            let dst = self
                .mem
                .get_mut(o..o + bytes.len())
                .ok_or(RamFlashError(NorFlashErrorKind::OutOfBounds))?;
            let torn = self.tear_after.take();
            let n = torn.map_or(bytes.len(), |n| n.min(bytes.len()));
            for (d, s) in dst.iter_mut().zip(&bytes[..n]) {
                *d &= *s;
            }
            match torn {
                Some(_) => Err(RamFlashError(NorFlashErrorKind::Other)),
                None => Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::RamFlash;
    use super::*;
    use crate::store::ConfigStore;

    const OFFSET: u32 = 4096;
    const SECTORS: usize = 3;

    fn blank() -> RamFlash {
        RamFlash::new(SECTORS)
    }

    #[test]
    fn blank_flash_opens_empty() {
        let store = FlashStore::open(blank(), OFFSET).unwrap();
        assert!(store.cache().is_empty());
        assert_eq!(store.active, None);
    }

    #[test]
    fn committed_values_survive_reopen() {
        let mut store = FlashStore::open(blank(), OFFSET).unwrap();
        store.set("wifi", "ssid", "home net").unwrap();
        store.set("wifi", "pass", "line1\nline2").unwrap();
        store.commit().unwrap();

        let flash = store.into_flash();
        assert_eq!(flash.mem[..4], [0xFF; 4]); // sector 0 untouched
        let store = FlashStore::open(flash, OFFSET).unwrap();
        assert_eq!(store.get("wifi", "ssid").unwrap(), "home net");
        assert_eq!(store.get("wifi", "pass").unwrap(), "line1\nline2");
    }

    #[test]
    fn commits_alternate_slots_and_newest_wins() {
        let mut store = FlashStore::open(blank(), OFFSET).unwrap();
        for (n, ssid) in ["a", "b", "c"].into_iter().enumerate() {
            store.set("wifi", "ssid", ssid).unwrap();
            store.commit().unwrap();
            let slot = store.active.unwrap();
            assert_eq!(slot.seq, n as u32 + 1);
            assert_eq!(slot.index, n as u32 % SLOTS);
        }

        let store = FlashStore::open(store.into_flash(), OFFSET).unwrap();
        assert_eq!(store.get("wifi", "ssid").unwrap(), "c");
        assert_eq!(store.active, Some(Slot { index: 0, seq: 3 }));
    }

    #[test]
    fn interrupted_commit_keeps_previous_image() {
        let mut store = FlashStore::open(blank(), OFFSET).unwrap();
        store.set("wifi", "ssid", "old").unwrap();
        store.commit().unwrap();

        // cut inside the header, then inside the body
        for tear in [6, HEADER_LEN + 2] {
            let mut flash = store.into_flash();
            flash.tear_after = Some(tear);
            store = FlashStore::open(flash, OFFSET).unwrap();
            store.set("wifi", "ssid", "new").unwrap();
            assert_eq!(store.commit(), Err(StoreError::Io));

            store = FlashStore::open(store.into_flash(), OFFSET).unwrap();
            assert_eq!(store.get("wifi", "ssid").unwrap(), "old");
            assert_eq!(store.active, Some(Slot { index: 0, seq: 1 }));
        }

        // the next good commit lands in the damaged slot
        store.set("wifi", "ssid", "new").unwrap();
        store.commit().unwrap();
        let store = FlashStore::open(store.into_flash(), OFFSET).unwrap();
        assert_eq!(store.get("wifi", "ssid").unwrap(), "new");
        assert_eq!(store.active, Some(Slot { index: 1, seq: 2 }));
    }

    #[test]
    fn sequence_order_wraps() {
        assert!(is_newer(2, 1));
        assert!(!is_newer(1, 2));
        assert!(!is_newer(7, 7));
        assert!(is_newer(0, u32::MAX));
    }

    #[test]
    fn crc_matches_reference_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn uncommitted_changes_are_lost() {
        let mut store = FlashStore::open(blank(), OFFSET).unwrap();
        store.set("device", "name", "Porch").unwrap();
        let store = FlashStore::open(store.into_flash(), OFFSET).unwrap();
        assert_eq!(store.get("device", "name"), Err(StoreError::NotFound));
    }

    #[test]
    fn commit_skips_erase_when_clean() {
        let mut store = FlashStore::open(blank(), OFFSET).unwrap();
        store.set("wifi", "ssid", "a").unwrap();
        store.commit().unwrap();
        store.set("wifi", "ssid", "a").unwrap();
        store.commit().unwrap();
        store.clear("device").unwrap();
        store.commit().unwrap();
        assert_eq!(store.into_flash().erases, 1);
    }

    #[test]
    fn credentials_clear_through_config_store() {
        let mut cfg = ConfigStore::new(FlashStore::open(blank(), OFFSET).unwrap());
        cfg.save_credentials(&crate::store::NetworkCredentials::new("home", "pw"))
            .unwrap();
        cfg.clear_credentials().unwrap();
        let reopened = FlashStore::open(cfg.into_inner().into_flash(), OFFSET).unwrap();
        assert!(ConfigStore::new(reopened).load_credentials().is_none());
    }

    #[test]
    fn oversized_store_is_rejected() {
        let mut store = FlashStore::open(blank(), OFFSET).unwrap();
        let big = "x".repeat(5000);
        store.set("device", "description", &big).unwrap();
        assert_eq!(store.commit(), Err(StoreError::NoSpace));
    }

    #[test]
    fn damaged_slots_read_as_corrupt() {
        let mut flash = blank();
        let o = OFFSET as usize;
        flash.mem[o..o + 4].copy_from_slice(b"TNKV");
        flash.mem[o + 8..o + 12].copy_from_slice(&9000u32.to_le_bytes());
        assert_eq!(read_slot(&mut flash, OFFSET), Err(StoreError::Corrupt));

        // plausible length, wrong checksum
        flash.mem[o + 8..o + 12].copy_from_slice(&4u32.to_le_bytes());
        flash.mem[o + 16..o + 20].copy_from_slice(b"a=b\n");
        assert_eq!(read_slot(&mut flash, OFFSET), Err(StoreError::Corrupt));

        let store = FlashStore::open(flash, OFFSET).unwrap();
        assert!(store.cache().is_empty());
    }

    #[test]
    fn misaligned_offset_is_rejected() {
        assert!(matches!(
            FlashStore::open(blank(), 100),
            Err(StoreError::Io)
        ));
    }
}
