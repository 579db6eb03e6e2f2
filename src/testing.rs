//! A host-side mock of [`crate::hal::Hal`] so every module can be unit
//! tested with `std`, the way the corpus's own test-only mocks work (see
//! `#![cfg_attr(not(test), no_std)]` host test builds in the wider corpus).
//! Only compiled under `cfg(test)`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::KernelError;
use crate::hal::{AddressSpace, BlockFile, Context, FileHandle, Frame, Hal, PageAllocator, Vpn};
use crate::param::PGSIZE;

/// Process-wide "are interrupts enabled" flag. Real hardware has one such
/// bit per hart; a single flag is enough since crate tests are
/// single-threaded and simulate multiple CPUs by swapping `Cpus::current`.
static INTR_ENABLED: AtomicBool = AtomicBool::new(true);

pub struct MockHal;

impl Hal for MockHal {
    type AddressSpace = MockAddressSpace;
    type Allocator = MockAllocator;
    type FileSystem = MockFileSystem;

    unsafe fn switch(from: *mut Context, to: *mut Context) {
        // No real stacks to swap between in a host test; callers only
        // care that both contexts are touched and control "returns".
        unsafe {
            core::mem::swap(&mut *from, &mut *to);
        }
    }

    fn new_context(entry: extern "C" fn(), stack_top: usize) -> Context {
        // Host tests never actually resume a `Context` on a borrowed stack;
        // they only check that `entry`/`stack_top` made it somewhere
        // recoverable for inspection.
        let mut ctx = Context::new();
        ctx._opaque[0] = entry as usize;
        ctx._opaque[1] = stack_top;
        ctx
    }

    fn intr_get() -> bool {
        INTR_ENABLED.load(Ordering::SeqCst)
    }

    fn intr_off() {
        INTR_ENABLED.store(false, Ordering::SeqCst);
    }

    fn intr_on() {
        INTR_ENABLED.store(true, Ordering::SeqCst);
    }
}

/// Resets global mock state between tests that rely on interrupts starting
/// enabled (most of them — `cargo test` runs tests on separate threads, but
/// each uses its own `Cpus`/`Procs`, only the interrupt flag is shared).
pub fn reset_interrupts() {
    INTR_ENABLED.store(true, Ordering::SeqCst);
}

/// A trivial bump allocator over a fixed pool of frames, enough to exhaust
/// on purpose in out-of-resource tests.
pub struct MockAllocator {
    free: Mutex<Vec<usize>>,
}

impl MockAllocator {
    pub fn new(frame_count: usize) -> Self {
        Self {
            free: Mutex::new((0..frame_count).map(|i| i * PGSIZE).collect()),
        }
    }
}

impl PageAllocator for MockAllocator {
    fn alloc_frame(&self) -> Option<Frame> {
        self.free.lock().unwrap().pop().map(Frame)
    }

    fn free_frame(&self, frame: Frame) {
        self.free.lock().unwrap().push(frame.0);
    }
}

/// A page-table-free stand-in for a user address space: a map from vpn to
/// either a resident page's bytes, or "swapped out".
#[derive(Default)]
pub struct MockAddressSpace {
    size: usize,
    pages: HashMap<Vpn, MockPage>,
}

enum MockPage {
    Resident {
        frame: Frame,
        bytes: [u8; PGSIZE],
        accessed: bool,
        dirty: bool,
    },
    Swapped,
}

impl MockAddressSpace {
    pub fn new(initial_pages: usize, alloc: &MockAllocator) -> Self {
        let mut pages = HashMap::new();
        for vpn in 0..initial_pages {
            let frame = alloc.alloc_frame().expect("mock out of frames");
            pages.insert(
                vpn,
                MockPage::Resident {
                    frame,
                    bytes: [0u8; PGSIZE],
                    accessed: false,
                    dirty: false,
                },
            );
        }
        Self {
            size: initial_pages * PGSIZE,
            pages,
        }
    }

    /// Test hook: mark a page as having been touched/written since the last
    /// classification scan, simulating hardware A/D bits.
    pub fn touch(&mut self, vpn: Vpn, accessed: bool, dirty: bool) {
        if let Some(MockPage::Resident {
            accessed: a,
            dirty: d,
            ..
        }) = self.pages.get_mut(&vpn)
        {
            *a = accessed;
            *d = dirty;
        }
    }
}

impl AddressSpace for MockAddressSpace {
    fn size(&self) -> usize {
        self.size
    }

    fn resize(&mut self, delta: isize, alloc: &impl PageAllocator) -> Result<usize, KernelError> {
        if delta >= 0 {
            let grow_pages = (delta as usize).div_ceil(PGSIZE);
            for _ in 0..grow_pages {
                let vpn = self.size / PGSIZE;
                let frame = alloc.alloc_frame().ok_or(KernelError::OutOfResource)?;
                self.pages.insert(
                    vpn,
                    MockPage::Resident {
                        frame,
                        bytes: [0u8; PGSIZE],
                        accessed: false,
                        dirty: false,
                    },
                );
                self.size += PGSIZE;
            }
        } else {
            let shrink = (-delta) as usize;
            if shrink > self.size {
                return Err(KernelError::InvalidArgument);
            }
            let shrink_pages = shrink / PGSIZE;
            for _ in 0..shrink_pages {
                self.size -= PGSIZE;
                let vpn = self.size / PGSIZE;
                if let Some(MockPage::Resident { frame, .. }) = self.pages.remove(&vpn) {
                    alloc.free_frame(frame);
                }
            }
        }
        Ok(self.size)
    }

    fn fork_from(&self, alloc: &impl PageAllocator) -> Result<Self, KernelError> {
        let mut copy = MockAddressSpace {
            size: self.size,
            pages: HashMap::new(),
        };
        for (&vpn, page) in self.pages.iter() {
            match page {
                MockPage::Resident { bytes, accessed, dirty, .. } => {
                    let frame = alloc.alloc_frame().ok_or(KernelError::OutOfResource)?;
                    copy.pages.insert(
                        vpn,
                        MockPage::Resident {
                            frame,
                            bytes: *bytes,
                            accessed: *accessed,
                            dirty: *dirty,
                        },
                    );
                }
                MockPage::Swapped => {
                    copy.pages.insert(vpn, MockPage::Swapped);
                }
            }
        }
        Ok(copy)
    }

    fn for_each_present_page(&self, f: &mut dyn FnMut(Vpn, bool, bool)) {
        let first_vpn = 1;
        for (&vpn, page) in self.pages.iter() {
            if vpn < first_vpn {
                continue;
            }
            if let MockPage::Resident { accessed, dirty, .. } = page {
                f(vpn, *accessed, *dirty);
            }
        }
    }

    fn mark_swapped_out(&mut self, vpn: Vpn) -> Frame {
        let frame = match self.pages.insert(vpn, MockPage::Swapped) {
            Some(MockPage::Resident { frame, .. }) => frame,
            _ => panic!("mark_swapped_out: vpn not resident"),
        };
        frame
    }

    fn is_swapped_out(&self, vpn: Vpn) -> bool {
        matches!(self.pages.get(&vpn), Some(MockPage::Swapped))
    }

    fn install_swapped_in(&mut self, vpn: Vpn, frame: Frame) {
        self.pages.insert(
            vpn,
            MockPage::Resident {
                frame,
                bytes: [0u8; PGSIZE],
                accessed: false,
                dirty: false,
            },
        );
    }

    fn copy_out(&self, va: usize, dst: &mut [u8]) -> Result<(), KernelError> {
        let vpn = va / PGSIZE;
        let off = va % PGSIZE;
        match self.pages.get(&vpn) {
            Some(MockPage::Resident { bytes, .. }) if off + dst.len() <= PGSIZE => {
                dst.copy_from_slice(&bytes[off..off + dst.len()]);
                Ok(())
            }
            _ => Err(KernelError::InvalidArgument),
        }
    }

    fn copy_in(&mut self, va: usize, src: &[u8]) -> Result<(), KernelError> {
        let vpn = va / PGSIZE;
        let off = va % PGSIZE;
        match self.pages.get_mut(&vpn) {
            Some(MockPage::Resident { bytes, .. }) if off + src.len() <= PGSIZE => {
                bytes[off..off + src.len()].copy_from_slice(src);
                Ok(())
            }
            _ => Err(KernelError::InvalidArgument),
        }
    }

    fn read_page(&self, vpn: Vpn, buf: &mut [u8; PGSIZE]) {
        if let Some(MockPage::Resident { bytes, .. }) = self.pages.get(&vpn) {
            buf.copy_from_slice(bytes);
        }
    }

    fn write_page(&mut self, vpn: Vpn, buf: &[u8; PGSIZE]) {
        if let Some(MockPage::Resident { bytes, .. }) = self.pages.get_mut(&vpn) {
            bytes.copy_from_slice(buf);
        }
    }

    fn teardown(&mut self, alloc: &impl PageAllocator) {
        for page in self.pages.values() {
            if let MockPage::Resident { frame, .. } = page {
                alloc.free_frame(*frame);
            }
        }
        self.pages.clear();
        self.size = 0;
    }

    fn flush_tlb(&self) {}

    fn activate(&self) {}
}

/// An in-memory filesystem standing in for the swap area, with a quota
/// counter the daemons can bump against in tests.
#[derive(Default)]
pub struct MockFileSystem {
    files: Mutex<HashMap<String, Vec<u8>>>,
    next_handle: Mutex<u32>,
    handles: Mutex<HashMap<u32, String>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }
}

impl BlockFile for MockFileSystem {
    fn begin_op(&self) {}
    fn end_op(&self) {}

    fn create(&self, name: &str) -> Result<FileHandle, KernelError> {
        self.files
            .lock()
            .unwrap()
            .insert(name.to_string(), Vec::new());
        let mut next = self.next_handle.lock().unwrap();
        let handle = *next;
        *next += 1;
        self.handles
            .lock()
            .unwrap()
            .insert(handle, name.to_string());
        Ok(FileHandle(handle))
    }

    fn open(&self, name: &str) -> Result<FileHandle, KernelError> {
        if !self.files.lock().unwrap().contains_key(name) {
            return Err(KernelError::OutOfResource);
        }
        let mut next = self.next_handle.lock().unwrap();
        let handle = *next;
        *next += 1;
        self.handles
            .lock()
            .unwrap()
            .insert(handle, name.to_string());
        Ok(FileHandle(handle))
    }

    fn read(&self, handle: FileHandle, offset: usize, buf: &mut [u8]) -> Result<usize, KernelError> {
        let handles = self.handles.lock().unwrap();
        let name = handles.get(&handle.0).ok_or(KernelError::InvalidArgument)?;
        let files = self.files.lock().unwrap();
        let data = files.get(name).ok_or(KernelError::InvalidArgument)?;
        let n = buf.len().min(data.len().saturating_sub(offset));
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        Ok(n)
    }

    fn write(&self, handle: FileHandle, offset: usize, buf: &[u8]) -> Result<usize, KernelError> {
        let handles = self.handles.lock().unwrap();
        let name = handles.get(&handle.0).ok_or(KernelError::InvalidArgument)?;
        let mut files = self.files.lock().unwrap();
        let data = files.get_mut(name).ok_or(KernelError::InvalidArgument)?;
        if data.len() < offset + buf.len() {
            data.resize(offset + buf.len(), 0);
        }
        data[offset..offset + buf.len()].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn close(&self, handle: FileHandle) {
        self.handles.lock().unwrap().remove(&handle.0);
    }

    fn unlink(&self, name: &str) -> Result<(), KernelError> {
        self.files
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or(KernelError::InvalidArgument)
    }
}
