use std::io;
use std::ptr;

/// Executable memory that host code is emitted into.
///
/// The mapping is readable, writable and executable for its whole
/// lifetime: units are appended while earlier ones may be running,
/// and branch displacements are patched in place. Multi-byte writes
/// use host byte order.
pub struct CodeBuffer {
    base: *mut u8,
    size: usize,
    offset: usize,
}

// SAFETY: the mapping is owned exclusively by this value.
unsafe impl Send for CodeBuffer {}

impl CodeBuffer {
    /// Map `size` bytes, rounded up to whole pages.
    pub fn new(size: usize) -> io::Result<Self> {
        let page = page_size();
        let size = size.max(1).div_ceil(page) * page;

        // SAFETY: anonymous private mapping with no file behind it.
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        tracing::debug!(size, "mapped code buffer");

        Ok(Self {
            base: base as *mut u8,
            size,
            offset: 0,
        })
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.size - self.offset
    }

    #[inline]
    pub fn base_ptr(&self) -> *const u8 {
        self.base
    }

    #[inline]
    pub fn ptr_at(&self, offset: usize) -> *const u8 {
        assert!(offset <= self.size);
        // SAFETY: within the mapping, or one past its end.
        unsafe { self.base.add(offset) }
    }

    /// Buffer offset of a host code pointer, if it points into the
    /// mapping.
    pub fn offset_of(&self, p: *const u8) -> Option<usize> {
        let off = (p as usize).checked_sub(self.base as usize)?;
        (off < self.size).then_some(off)
    }

    /// Move the write position; everything after it is dead code.
    #[inline]
    pub fn set_offset(&mut self, offset: usize) {
        assert!(offset <= self.size);
        self.offset = offset;
    }

    /// Copy `bytes` to `at`, which must lie inside the mapping.
    #[inline]
    fn put(&mut self, at: usize, bytes: &[u8]) {
        assert!(
            at.checked_add(bytes.len()).is_some_and(|end| end <= self.size),
            "code buffer overflow"
        );
        // SAFETY: bounds checked above; the source is a Rust slice.
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), self.base.add(at), bytes.len()) };
    }

    #[inline]
    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.put(self.offset, bytes);
        self.offset += bytes.len();
    }

    #[inline]
    pub fn emit_u8(&mut self, val: u8) {
        self.emit_bytes(&[val]);
    }

    #[inline]
    pub fn emit_u16(&mut self, val: u16) {
        self.emit_bytes(&val.to_ne_bytes());
    }

    #[inline]
    pub fn emit_u32(&mut self, val: u32) {
        self.emit_bytes(&val.to_ne_bytes());
    }

    #[inline]
    pub fn emit_u64(&mut self, val: u64) {
        self.emit_bytes(&val.to_ne_bytes());
    }

    /// Overwrite four already emitted bytes (branch displacements).
    #[inline]
    pub fn patch_u32(&mut self, offset: usize, val: u32) {
        self.put(offset, &val.to_ne_bytes());
    }

    #[inline]
    pub fn read_u32(&self, offset: usize) -> u32 {
        assert!(offset + 4 <= self.size);
        let mut b = [0u8; 4];
        // SAFETY: bounds checked above.
        unsafe { ptr::copy_nonoverlapping(self.base.add(offset), b.as_mut_ptr(), 4) };
        u32::from_ne_bytes(b)
    }

    /// Everything emitted so far.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: base..base+offset lies inside the mapping.
        unsafe { std::slice::from_raw_parts(self.base, self.offset) }
    }
}

impl Drop for CodeBuffer {
    fn drop(&mut self) {
        // SAFETY: base/size are exactly what mmap returned.
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, self.size);
        }
    }
}

fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page > 0 {
        page as usize
    } else {
        4096
    }
}
