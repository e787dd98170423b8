use std::io::{Read, Seek, SeekFrom, Write};

use crate::config::PAGE_SIZE;
use crate::errors::DiskError;
use crate::storage::PageId;

/// Byte-level page I/O over any seekable stream.
///
/// Pages live at offset `page_id * PAGE_SIZE`; the address space is dense
/// and starts at page 0. Tests run against `Cursor<Vec<u8>>`, real
/// databases against `File`.
pub struct DiskManager<R: Read + Write + Seek> {
    io: R,
}

impl<R: Read + Write + Seek> DiskManager<R> {
    pub fn new(io: R) -> Self {
        DiskManager { io }
    }

    /// Reads page `page_id` into `buf`.
    ///
    /// Bytes past the end of the backing stream read as zero: a freshly
    /// allocated page that was never written has no bytes on disk yet.
    pub fn read_page(&mut self, page_id: PageId, buf: &mut [u8]) -> Result<(), DiskError> {
        assert_eq!(buf.len(), PAGE_SIZE, "page buffers are exactly one page");

        let offset = page_id as u64 * PAGE_SIZE as u64;
        self.io.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < PAGE_SIZE {
            match self.io.read(&mut buf[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        buf[filled..].fill(0);

        Ok(())
    }

    /// Writes the full page `page_id` from `buf`.
    pub fn write_page(&mut self, page_id: PageId, buf: &[u8]) -> Result<(), DiskError> {
        assert_eq!(buf.len(), PAGE_SIZE, "page buffers are exactly one page");

        let offset = page_id as u64 * PAGE_SIZE as u64;
        self.io.seek(SeekFrom::Start(offset))?;
        self.io.write_all(buf)?;
        self.io.flush()?;

        Ok(())
    }

    /// Extends the backing stream with zeros so that pages `[0, npages)`
    /// are addressable. Never shrinks.
    pub fn increase_disk_space(&mut self, npages: u32) -> Result<(), DiskError> {
        let target = npages as u64 * PAGE_SIZE as u64;
        let end = self.io.seek(SeekFrom::End(0))?;
        if end >= target {
            return Ok(());
        }

        let zeros = [0u8; PAGE_SIZE];
        let mut remaining = target - end;
        while remaining > 0 {
            let n = remaining.min(PAGE_SIZE as u64) as usize;
            self.io.write_all(&zeros[..n])?;
            remaining -= n as u64;
        }
        self.io.flush()?;

        Ok(())
    }

    /// Marks the on-disk page as free. Space is never reclaimed; the id is
    /// simply not handed out again.
    pub fn deallocate_page(&mut self, _page_id: PageId) {}
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use rand::RngCore;

    use super::*;

    fn random_page() -> [u8; PAGE_SIZE] {
        let mut data = [0u8; PAGE_SIZE];
        rand::thread_rng().fill_bytes(&mut data);
        data
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let mut disk = DiskManager::new(Cursor::new(Vec::new()));

        let page = random_page();
        disk.write_page(1, &page).unwrap();

        let mut buf = [0u8; PAGE_SIZE];
        disk.read_page(1, &mut buf).unwrap();

        assert_eq!(buf, page);
    }

    #[test]
    fn test_read_of_never_written_page_is_zeros() {
        let mut disk = DiskManager::new(Cursor::new(Vec::new()));

        let mut buf = [0xffu8; PAGE_SIZE];
        disk.read_page(5, &mut buf).unwrap();

        assert_eq!(buf, [0u8; PAGE_SIZE]);
    }

    #[test]
    fn test_write_does_not_influence_other_pages() {
        let mut disk = DiskManager::new(Cursor::new(Vec::new()));

        let page = random_page();
        disk.write_page(2, &page).unwrap();

        let mut buf = [0u8; PAGE_SIZE];
        disk.read_page(3, &mut buf).unwrap();
        assert_eq!(buf, [0u8; PAGE_SIZE]);

        disk.read_page(2, &mut buf).unwrap();
        assert_eq!(buf, page);
    }

    #[test]
    fn test_increase_disk_space_grows_and_never_shrinks() {
        let mut cursor = Cursor::new(Vec::new());
        let mut disk = DiskManager::new(&mut cursor);

        disk.increase_disk_space(3).unwrap();
        disk.increase_disk_space(1).unwrap();
        drop(disk);

        assert_eq!(cursor.get_ref().len(), 3 * PAGE_SIZE);
    }

    #[test]
    fn test_file_backed_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(dir.path().join("pages.db"))
            .unwrap();
        let mut disk = DiskManager::new(file);

        let page = random_page();
        disk.increase_disk_space(4).unwrap();
        disk.write_page(3, &page).unwrap();

        let mut buf = [0u8; PAGE_SIZE];
        disk.read_page(3, &mut buf).unwrap();
        assert_eq!(buf, page);

        disk.read_page(0, &mut buf).unwrap();
        assert_eq!(buf, [0u8; PAGE_SIZE]);
    }
}
