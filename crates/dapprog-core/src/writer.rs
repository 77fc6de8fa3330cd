//! Buffered sector/page write engine
//!
//! `BufferedFlashWriter` accepts writes at arbitrary addresses (forward,
//! backward, overlapping or sparse) and turns them into erase-then-program
//! sequences that respect the target's sector and program granularity.
//!
//! The writer keeps one write block in memory. A write block is the
//! smaller of the erase sector and the buffer capacity, so every flush
//! programs exactly one aligned block:
//!
//! ```text
//!  sector.addr                                   sector.addr + sector.size
//!  |<--------------------- erased sector --------------------------->|
//!  |  block 0  |  block 1  |  block 2  |  ...                        |
//!              ^ block.addr, buffered in RAM until the cursor leaves it
//! ```
//!
//! Leaving the current block (by writing past its end or by jumping to a
//! different address) flushes it. Leaving the current sector erases the
//! next one. A sector is erased whenever the cursor enters it, so writing
//! back into a sector that was already left erases it again.

use crate::error::{Error, Result, TargetOperation};
use crate::target::{Capabilities, FlashAlgorithmTarget};

/// Default capacity of the page buffer in bytes
pub const DEFAULT_PAGE_BUFFER_SIZE: usize = 1024;

/// The erased value for flash memory (all bits set)
pub const ERASED_VALUE: u8 = 0xFF;

/// Round `value` down to a multiple of `boundary`
///
/// A zero boundary leaves the value unchanged.
#[inline]
pub fn round_down(value: u32, boundary: u32) -> u32 {
    value.checked_rem(boundary).map_or(value, |rem| value - rem)
}

/// Round `value` up to a multiple of `boundary`
///
/// A zero boundary leaves the value unchanged.
#[inline]
pub fn round_up(value: u32, boundary: u32) -> u32 {
    match value.checked_rem(boundary) {
        None | Some(0) => value,
        Some(rem) => value + (boundary - rem),
    }
}

/// Lifecycle of a write session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No target attached
    Closed,
    /// Target initialized, writes accepted
    Open,
    /// A target operation failed; only `uninit` is accepted
    Error,
}

/// An aligned address range
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Span {
    addr: u32,
    size: u32,
}

impl Span {
    fn end(&self) -> u64 {
        self.addr as u64 + self.size as u64
    }

    fn contains(&self, addr: u32) -> bool {
        addr >= self.addr && (addr as u64) < self.end()
    }
}

/// Buffered flash writer over a loaded flash algorithm
///
/// `N` is the page buffer capacity and therefore the largest block that
/// is programmed in a single `program_page` call.
///
/// # Example
///
/// ```ignore
/// let mut writer: BufferedFlashWriter<'_, _> = BufferedFlashWriter::new();
/// writer.init(&mut target)?;
/// for (addr, data) in chunks {
///     writer.write(addr, data)?;
/// }
/// writer.uninit()?;
/// ```
pub struct BufferedFlashWriter<
    'a,
    T: FlashAlgorithmTarget + ?Sized,
    const N: usize = DEFAULT_PAGE_BUFFER_SIZE,
> {
    target: Option<&'a mut T>,
    state: SessionState,
    buffer: [u8; N],
    buffer_empty: bool,
    block: Span,
    sector: Span,
    sector_valid: bool,
    last_write_addr: u32,
}

impl<'a, T: FlashAlgorithmTarget + ?Sized, const N: usize> Default
    for BufferedFlashWriter<'a, T, N>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T: FlashAlgorithmTarget + ?Sized, const N: usize> BufferedFlashWriter<'a, T, N> {
    /// Create a closed writer
    pub const fn new() -> Self {
        Self {
            target: None,
            state: SessionState::Closed,
            buffer: [ERASED_VALUE; N],
            buffer_empty: true,
            block: Span { addr: 0, size: 0 },
            sector: Span { addr: 0, size: 0 },
            sector_valid: false,
            last_write_addr: 0,
        }
    }

    /// Capacity of the page buffer
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether writes are currently accepted
    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// The attached target, if a session is open or failed
    pub fn target(&self) -> Option<&T> {
        self.target.as_deref()
    }

    /// Open a session on `target`
    ///
    /// # Errors
    /// * `AlreadyOpen` - a session is open or failed and was not closed;
    ///   the target is not touched
    /// * `InvalidTarget` - the algorithm lacks a required entry point
    /// * `TargetOperationFailed` - the algorithm's `Init()` failed
    pub fn init(&mut self, target: &'a mut T) -> Result<()> {
        if self.state != SessionState::Closed {
            return Err(Error::AlreadyOpen);
        }

        let missing = Capabilities::REQUIRED.difference(target.capabilities());
        if !missing.is_empty() {
            return Err(Error::InvalidTarget { missing });
        }

        self.reset();

        target
            .init()
            .map_err(|fault| Error::target(TargetOperation::Init, fault))?;

        self.target = Some(target);
        self.state = SessionState::Open;
        Ok(())
    }

    /// Buffer `data` for programming at `addr`
    ///
    /// Sectors are erased as the write cursor enters them and blocks are
    /// programmed as it leaves them. Data still buffered when the call
    /// returns is programmed by a later write or by `uninit`.
    ///
    /// On failure the session moves to `SessionState::Error`; blocks that
    /// were already programmed stay programmed.
    pub fn write(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        if self.state != SessionState::Open {
            return Err(Error::NotOpen);
        }

        let result = self.write_inner(addr, data);
        if let Err(e) = result {
            log::warn!("Write at 0x{:08X} failed: {}", addr, e);
            self.state = SessionState::Error;
        }
        result
    }

    /// Close the session
    ///
    /// Programs any pending block (only if the session did not fail), then
    /// always runs the algorithm's `UnInit()` and resets the writer. An
    /// `UnInit()` failure takes priority over a program failure.
    pub fn uninit(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Err(Error::NotOpen);
        }

        let flush_result = if self.state == SessionState::Open {
            self.flush_current_block(0)
        } else {
            Ok(())
        };

        let uninit_result = match self.target.take() {
            Some(target) => target
                .uninit()
                .map_err(|fault| Error::target(TargetOperation::Uninit, fault)),
            None => Ok(()),
        };

        self.reset();

        uninit_result.and(flush_result)
    }

    fn reset(&mut self) {
        self.target = None;
        self.state = SessionState::Closed;
        self.buffer.fill(ERASED_VALUE);
        self.buffer_empty = true;
        self.block = Span::default();
        self.sector = Span::default();
        self.sector_valid = false;
        self.last_write_addr = 0;
    }

    fn write_inner(&mut self, mut addr: u32, mut data: &[u8]) -> Result<()> {
        if !self.sector_valid {
            self.setup_next_sector(addr)?;
            self.sector_valid = true;
            self.last_write_addr = addr;
        }

        // Non-increasing addresses: the buffered block must be programmed
        // before the buffer is reused for another block.
        if round_down(addr, self.block.size) != round_down(self.last_write_addr, self.block.size) {
            self.flush_current_block(addr)?;
        }

        if round_down(addr, self.sector.size) != round_down(self.last_write_addr, self.sector.size)
        {
            self.setup_next_sector(addr)?;
        }

        loop {
            if !self.block.contains(addr) {
                self.flush_current_block(addr)?;
            }

            if data.is_empty() {
                break;
            }

            if !self.sector.contains(addr) {
                self.setup_next_sector(addr)?;
                continue;
            }

            let offset = (addr - self.block.addr) as usize;
            let len = data.len().min(self.block.size as usize - offset);
            self.buffer[offset..offset + len].copy_from_slice(&data[..len]);
            self.buffer_empty = false;

            addr = addr.wrapping_add(len as u32);
            data = &data[len..];
        }

        self.last_write_addr = addr;
        Ok(())
    }

    /// Program the buffered block (if any) and re-home the buffer on the
    /// block containing `addr`
    fn flush_current_block(&mut self, addr: u32) -> Result<()> {
        let size = self.block.size as usize;
        let mut status = Ok(());

        if !self.buffer_empty {
            let target = self.target.as_deref_mut().ok_or(Error::NotOpen)?;
            log::trace!("Programming {} bytes at 0x{:08X}", size, self.block.addr);
            status = target
                .program_page(self.block.addr, &self.buffer[..size])
                .map_err(|fault| {
                    Error::target(TargetOperation::ProgramPage(self.block.addr), fault)
                });
            // Marked empty even on failure so a retry never programs twice
            self.buffer_empty = true;
        }

        self.buffer[..size].fill(ERASED_VALUE);
        self.block.addr = round_down(addr, self.block.size);

        status
    }

    /// Query geometry for `addr`, select the algorithm and erase its sector
    fn setup_next_sector(&mut self, addr: u32) -> Result<()> {
        let target = self.target.as_deref_mut().ok_or(Error::NotOpen)?;

        let page_size = target.program_page_min_size(addr);
        let sector_size = target.erase_sector_size(addr);
        if page_size == 0 || sector_size == 0 {
            return Err(Error::GeometryError {
                addr,
                page_size,
                sector_size,
            });
        }

        let sector_addr = round_down(addr, sector_size);
        self.sector = Span {
            addr: sector_addr,
            size: sector_size,
        };
        self.block = Span {
            addr: sector_addr,
            size: sector_size.min(N as u32),
        };

        log::debug!(
            "Preparing sector 0x{:08X} ({} bytes, write block {} bytes)",
            sector_addr,
            sector_size,
            self.block.size
        );

        // Regions served by a different algorithm start on a sector boundary
        if target.capabilities().contains(Capabilities::SELECT_ALGORITHM) {
            if let Err(fault) = target.select_algorithm(sector_addr) {
                let _ = target.uninit();
                return Err(Error::target(
                    TargetOperation::SelectAlgorithm(sector_addr),
                    fault,
                ));
            }
        }

        if let Err(fault) = target.erase_sector(sector_addr) {
            let _ = target.uninit();
            return Err(Error::target(TargetOperation::EraseSector(sector_addr), fault));
        }

        self.buffer[..self.block.size as usize].fill(ERASED_VALUE);

        Ok(())
    }
}
