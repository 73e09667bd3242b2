use crate::{
    arch,
    arch::exceptions::ExceptionContext,
    memory::address::{Address, PhysicalAddress, VirtualAddress},
    prelude::*,
    process::ProcessHandle,
    sync::spinlock::SpinLock,
    thread::{self, ThreadHandle},
};

use super::{virtqueue::CommandQueue, DeviceStatus, Subdev, VirtioMmioRegs};

use core::sync::atomic::{AtomicBool, Ordering};

use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};

const CONTROLQ_IDX: u32 = 0;
const QUEUE_SIZE: usize = 8;

const FB_WIDTH: u32 = 320;
const FB_HEIGHT: u32 = 200;
const FB_SIZE_BYTES: usize = (FB_WIDTH * FB_HEIGHT) as usize * 4;
const RESOURCE_ID: u32 = 666;
const FORMAT_BGRA8_UNORM: u32 = 1;

// Type codes and response codes are fixed by the virtio-gpu specification.
const CMD_RESOURCE_CREATE_2D: u32 = 0x0101;
const CMD_SET_SCANOUT: u32 = 0x0103;
const CMD_RESOURCE_FLUSH: u32 = 0x0104;
const CMD_TRANSFER_TO_HOST_2D: u32 = 0x0105;
const CMD_RESOURCE_ATTACH_BACKING: u32 = 0x0106;
const RESP_OK_NODATA: u32 = 0x1100;

// Distinct from any valid response type so a stale read is caught instead of looking like success.
const RESPONSE_SENTINEL: u32 = 0xDEAD_BEEF;

// Tag identifying the "command completed" condition in the generic thread wait/wake channel.
const IN_FLIGHT_CHANNEL: u64 = 0x6770755f696e666c;

static IN_FLIGHT: AtomicBool = AtomicBool::new(false);

static DRIVER: SpinLock<Option<GpuDriverImpl>> = SpinLock::new(None);

#[repr(C, align(4096))]
struct Framebuffer([u8; FB_SIZE_BYTES]);

static mut FRAMEBUFFER: Framebuffer = Framebuffer([0; FB_SIZE_BYTES]);

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct ControlHeader {
    type_: u32,
    flags: u32,
    fence_id: u64,
    ctx_id: u32,
    padding: u32,
}

impl ControlHeader {
    fn new(type_: u32) -> Self {
        Self {
            type_,
            ..Default::default()
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct Rect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl Rect {
    const fn full_framebuffer() -> Self {
        Self {
            x: 0,
            y: 0,
            width: FB_WIDTH,
            height: FB_HEIGHT,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct MemEntry {
    addr: u64,
    length: u32,
    padding: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct ResourceCreate2d {
    hdr: ControlHeader,
    resource_id: u32,
    format: u32,
    width: u32,
    height: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct ResourceAttachBacking {
    hdr: ControlHeader,
    resource_id: u32,
    nr_entries: u32,
    entry: MemEntry,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct SetScanout {
    hdr: ControlHeader,
    rect: Rect,
    scanout_id: u32,
    resource_id: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct TransferToHost2d {
    hdr: ControlHeader,
    rect: Rect,
    offset: u64,
    resource_id: u32,
    padding: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct ResourceFlush {
    hdr: ControlHeader,
    rect: Rect,
    resource_id: u32,
    padding: u32,
}

fn framebuffer_region() -> (PhysicalAddress, usize) {
    let mm = crate::memory::MemoryManager::instance();
    #[allow(static_mut_refs)]
    let va = unsafe { VirtualAddress::new_unaligned(FRAMEBUFFER.0.as_ptr()) };
    (mm.translate_kernel_address(va).unwrap(), FB_SIZE_BYTES)
}

struct GpuDriverImpl {
    regs: &'static VirtioMmioRegs::Bank,
    controlq: CommandQueue<QUEUE_SIZE>,
    create_2d: ResourceCreate2d,
    attach_backing: ResourceAttachBacking,
    set_scanout: SetScanout,
    transfer: TransferToHost2d,
    flush: ResourceFlush,
    response: ControlHeader,
    // Monotonic 32-bit extension of the device's 16-bit used.idx, so wraparound never causes the
    // cursor to appear to skip backwards.
    used_cursor: u32,
    owner: Option<ProcessHandle>,
}

impl GpuDriverImpl {
    fn new(regs: &'static VirtioMmioRegs::Bank, controlq: CommandQueue<QUEUE_SIZE>) -> Self {
        Self {
            regs,
            controlq,
            create_2d: ResourceCreate2d::default(),
            attach_backing: ResourceAttachBacking::default(),
            set_scanout: SetScanout::default(),
            transfer: TransferToHost2d::default(),
            flush: ResourceFlush::default(),
            response: ControlHeader::new(RESPONSE_SENTINEL),
            used_cursor: 0,
            owner: None,
        }
    }

    fn request_va<T>(&self, field: &T) -> VirtualAddress {
        VirtualAddress::new_unaligned(field as *const T as *const u8)
    }

    fn request_pa<T>(&self, field: &T) -> PhysicalAddress {
        let mm = crate::memory::MemoryManager::instance();
        mm.translate_kernel_address(self.request_va(field)).unwrap()
    }

    fn extend_used_idx(&self, idx16: u16) -> u32 {
        let hi = self.used_cursor & !0xFFFF;
        let candidate = hi | idx16 as u32;
        if candidate < self.used_cursor {
            candidate.wrapping_add(0x1_0000)
        } else {
            candidate
        }
    }

    fn fill_create_2d(&mut self) -> (VirtualAddress, PhysicalAddress, u32) {
        self.create_2d = ResourceCreate2d {
            hdr: ControlHeader::new(CMD_RESOURCE_CREATE_2D),
            resource_id: RESOURCE_ID,
            format: FORMAT_BGRA8_UNORM,
            width: FB_WIDTH,
            height: FB_HEIGHT,
        };
        let va = self.request_va(&self.create_2d);
        let pa = self.request_pa(&self.create_2d);
        (va, pa, core::mem::size_of::<ResourceCreate2d>() as u32)
    }

    fn fill_attach_backing(&mut self) -> (VirtualAddress, PhysicalAddress, u32) {
        let (fb_pa, fb_len) = framebuffer_region();
        self.attach_backing = ResourceAttachBacking {
            hdr: ControlHeader::new(CMD_RESOURCE_ATTACH_BACKING),
            resource_id: RESOURCE_ID,
            nr_entries: 1,
            entry: MemEntry {
                addr: fb_pa.as_u64(),
                length: fb_len as u32,
                padding: 0,
            },
        };
        let va = self.request_va(&self.attach_backing);
        let pa = self.request_pa(&self.attach_backing);
        (va, pa, core::mem::size_of::<ResourceAttachBacking>() as u32)
    }

    fn fill_set_scanout(&mut self) -> (VirtualAddress, PhysicalAddress, u32) {
        self.set_scanout = SetScanout {
            hdr: ControlHeader::new(CMD_SET_SCANOUT),
            rect: Rect::full_framebuffer(),
            scanout_id: 0,
            resource_id: RESOURCE_ID,
        };
        let va = self.request_va(&self.set_scanout);
        let pa = self.request_pa(&self.set_scanout);
        (va, pa, core::mem::size_of::<SetScanout>() as u32)
    }

    fn fill_transfer(&mut self) -> (VirtualAddress, PhysicalAddress, u32) {
        self.transfer = TransferToHost2d {
            hdr: ControlHeader::new(CMD_TRANSFER_TO_HOST_2D),
            rect: Rect::full_framebuffer(),
            offset: 0,
            resource_id: RESOURCE_ID,
            padding: 0,
        };
        let va = self.request_va(&self.transfer);
        let pa = self.request_pa(&self.transfer);
        (va, pa, core::mem::size_of::<TransferToHost2d>() as u32)
    }

    fn fill_flush(&mut self) -> (VirtualAddress, PhysicalAddress, u32) {
        self.flush = ResourceFlush {
            hdr: ControlHeader::new(CMD_RESOURCE_FLUSH),
            rect: Rect::full_framebuffer(),
            resource_id: RESOURCE_ID,
            padding: 0,
        };
        let va = self.request_va(&self.flush);
        let pa = self.request_pa(&self.flush);
        (va, pa, core::mem::size_of::<ResourceFlush>() as u32)
    }
}

/// Fills descriptor 0/1, publishes the chain and kicks the device. Caller must hold DRIVER's
/// lock and must have already established that no command is currently in flight.
fn begin_submission(
    driver: &mut GpuDriverImpl,
    request_va: VirtualAddress,
    request_pa: PhysicalAddress,
    request_len: u32,
) {
    assert!(
        !IN_FLIGHT.swap(true, Ordering::AcqRel),
        "virtio-gpu: attempted to submit a command while one was already in flight"
    );

    driver.response.type_ = RESPONSE_SENTINEL;
    let response_va = driver.request_va(&driver.response);
    let response_pa = driver.request_pa(&driver.response);
    let response_len = core::mem::size_of::<ControlHeader>() as u32;

    // Both buffers live in cacheable driver memory and the device reads/writes them via DMA
    // (rings and descriptors are already uncached `DeviceMemoryAllocator` memory, so they need no
    // maintenance here); clean them to memory before the device can touch them, or it observes
    // stale bytes on the request and a later cache writeback of the sentinel could clobber its
    // response write.
    crate::arch::cache::clean_va_range(request_va, request_len as usize);
    crate::arch::cache::clean_va_range(response_va, response_len as usize);

    driver
        .controlq
        .prepare_request_descriptor(request_pa, request_len);
    driver
        .controlq
        .prepare_response_descriptor(response_pa, response_len);
    driver.controlq.publish_head();
    driver.regs.queue_notify.set(CONTROLQ_IDX);
}

/// Kernel-init wait: the caller must not be holding DRIVER's lock. Interrupts are enabled only
/// for the duration of the spin so the poll thread spawned in `probe` gets a chance to run and
/// drain the completion; see the module-level note on why this kernel has no real ISR dispatch.
fn wait_blocking_init() {
    arch::enable_irq();
    loop {
        aarch64_cpu::asm::barrier::dmb(aarch64_cpu::asm::barrier::SY);
        if !IN_FLIGHT.load(Ordering::Acquire) {
            break;
        }
    }
    arch::disable_irq();
}

fn submit_blocking_init(
    fill: impl FnOnce(&mut GpuDriverImpl) -> (VirtualAddress, PhysicalAddress, u32),
) {
    {
        let mut guard = DRIVER.lock();
        let driver = guard.as_mut().expect("gpu driver not initialized");
        assert!(
            !IN_FLIGHT.load(Ordering::Acquire),
            "gpu: bring-up is single-threaded, in-flight must be clear between commands"
        );
        let (va, pa, len) = fill(driver);
        begin_submission(driver, va, pa, len);
    }
    wait_blocking_init();
}

fn run_bring_up_commands() {
    submit_blocking_init(GpuDriverImpl::fill_create_2d);
    submit_blocking_init(GpuDriverImpl::fill_attach_backing);
    submit_blocking_init(GpuDriverImpl::fill_set_scanout);
    submit_blocking_init(GpuDriverImpl::fill_transfer);
    submit_blocking_init(GpuDriverImpl::fill_flush);
}

/// User-syscall wait. The dormant check and the in-flight set are performed under DRIVER's lock
/// in the same critical section, so two threads of the owning process racing on
/// `fb_transfer`/`fb_flush` (ownership is per-process, not per-thread, see `holds`) can't both
/// observe in-flight clear: the loser re-takes the lock after yielding instead of spinning past
/// it. Yielding (rather than a bare `spin_loop`) while the lock is released lets the poll thread
/// that substitutes for the ISR actually run and clear the flag. This kernel's blocking primitive
/// resumes the caller directly in userspace rather than back into this function, so unlike the
/// spec's literal "loop until dormant" the actual sleep can only be spent once per syscall, on
/// awaiting this caller's own completion.
fn submit_from_syscall(
    cx: &mut ExceptionContext,
    fill: impl FnOnce(&mut GpuDriverImpl) -> (VirtualAddress, PhysicalAddress, u32),
) {
    loop {
        let mut guard = DRIVER.lock();
        let driver = guard.as_mut().expect("gpu driver not initialized");
        if IN_FLIGHT.load(Ordering::Acquire) {
            drop(guard);
            crate::syscall::Syscall::yield_exec();
            continue;
        }
        let (va, pa, len) = fill(driver);
        begin_submission(driver, va, pa, len);
        break;
    }

    if IN_FLIGHT.load(Ordering::Acquire) {
        thread::wait_for_condition(cx, IN_FLIGHT_CHANNEL);
    }
}

/// Drains the used ring once. Acts as this driver's interrupt service routine; called both from
/// the poll thread spawned in `probe` and available as `handle_irq` for a future real dispatcher.
fn service_once() -> bool {
    let mut guard = DRIVER.lock();
    let driver = match guard.as_mut() {
        Some(driver) => driver,
        None => return false,
    };

    // Ack whatever of the two defined INTERRUPT_STATUS bits are pending, not just
    // USED_BUFFER_NOTIFICATION, so a CONFIGURATION_CHANGE_NOTIFICATION never stays un-acked.
    let pending = driver.regs.interrupt_status.get() & 0b11;
    if pending == 0 {
        return false;
    }
    driver.regs.interrupt_ack.set(pending);
    aarch64_cpu::asm::barrier::dmb(aarch64_cpu::asm::barrier::SY);

    let target = driver.extend_used_idx(driver.controlq.used_idx());
    let mut drained = false;
    while driver.used_cursor != target {
        let (id, _len) = driver.controlq.used_entry(driver.used_cursor as u16);
        if id != 0 {
            panic!(
                "virtio-gpu: used ring referenced descriptor head {}, expected 0",
                id
            );
        }

        crate::arch::cache::invalidate_va_range(
            VirtualAddress::new_unaligned(&driver.response as *const _ as *const u8),
            core::mem::size_of::<ControlHeader>(),
        );
        if driver.response.type_ != RESP_OK_NODATA {
            panic!(
                "virtio-gpu: command failed, did not get OK_NODATA (got 0x{:08x})",
                driver.response.type_
            );
        }

        driver.used_cursor = driver.used_cursor.wrapping_add(1);
        drained = true;
    }

    if drained {
        IN_FLIGHT.store(false, Ordering::Release);
    }
    drop(guard);

    if drained {
        thread::wake_condition(IN_FLIGHT_CHANNEL);
    }
    drained
}

/// Entry point a trap dispatcher would call directly once this kernel routes the device's MMIO
/// interrupt line to a real ISR. Until then, the poll thread spawned in `probe` is what actually
/// drives completions.
#[allow(dead_code)]
pub(crate) fn handle_irq() {
    service_once();
}

pub struct GpuSubdev {
    _poll_thread: ThreadHandle,
}

impl Subdev for GpuSubdev {}

impl GpuSubdev {
    pub fn probe(regs: &'static VirtioMmioRegs::Bank) -> Result<Self, super::Error> {
        regs.status.set(0);
        regs.status.modify(DeviceStatus::ACK::SET);
        regs.status.modify(DeviceStatus::DRIVER::SET);

        // No optional features (event idx, indirect descriptors, ...) are accepted.
        let _ = regs.device_features.get();
        regs.driver_features.set(0);

        regs.status.modify(DeviceStatus::FEATURES_OK::SET);
        if regs.status.read(DeviceStatus::FEATURES_OK) == 0 {
            log_warning!("virtio-gpu: device rejected the empty feature set");
            regs.status.modify(DeviceStatus::FAILED::SET);
            return Err(super::Error::InvalidFeatures);
        }

        regs.queue_sel.set(CONTROLQ_IDX);
        if regs.queue_ready.get() != 0 {
            log_warning!("virtio-gpu: control queue is already marked ready");
            return Err(super::Error::InitializationError);
        }
        let max_queue_size = regs.queue_num_max.get() as usize;
        if QUEUE_SIZE > max_queue_size {
            log_warning!(
                "virtio-gpu: control queue too small, device maximum is {}",
                max_queue_size
            );
            return Err(super::Error::InitializationError);
        }

        let mut controlq = CommandQueue::<QUEUE_SIZE>::allocate();
        regs.queue_num.set(QUEUE_SIZE as u32);

        let desc_table = controlq.descriptor_table();
        regs.queue_descriptor_low.set(desc_table.low_u32());
        regs.queue_descriptor_high.set(desc_table.high_u32());

        let avail_ring = controlq.available_ring();
        regs.queue_driver_low.set(avail_ring.low_u32());
        regs.queue_driver_high.set(avail_ring.high_u32());

        let used_ring = controlq.used_ring();
        regs.queue_device_low.set(used_ring.low_u32());
        regs.queue_device_high.set(used_ring.high_u32());

        regs.queue_ready.set(1);

        regs.status.modify(DeviceStatus::DRIVER_OK::SET);

        DRIVER.lock().replace(GpuDriverImpl::new(regs, controlq));

        // This device has no real ISR wired up to it (see the note on `handle_irq`), so
        // completions are observed by a poll thread instead, the same workaround the virtio
        // input driver in this tree already relies on.
        let poll_thread = thread::spawn(move || loop {
            service_once();
            crate::syscall::Syscall::yield_exec();
        });

        run_bring_up_commands();

        log_debug!("virtio-gpu: bring-up complete, {}x{} framebuffer live", FB_WIDTH, FB_HEIGHT);

        Ok(Self {
            _poll_thread: poll_thread,
        })
    }
}

/// Grants the calling process exclusive use of the framebuffer. Idempotent if it already holds
/// it; returns false if another process currently holds it.
pub(crate) fn acquire() -> bool {
    let pid = thread::current_pid().expect("fb_acquire called with no current process");
    let mut guard = DRIVER.lock();
    let driver = guard.as_mut().expect("gpu driver not initialized");
    match &driver.owner {
        None => {
            driver.owner = Some(pid);
            true
        }
        Some(owner) if *owner == pid => true,
        Some(_) => false,
    }
}

/// Releases ownership if the calling process currently holds it; a no-op otherwise.
pub(crate) fn release() {
    let pid = thread::current_pid().expect("fb_release called with no current process");
    let mut guard = DRIVER.lock();
    let driver = guard.as_mut().expect("gpu driver not initialized");
    if driver.owner.as_ref() == Some(&pid) {
        driver.owner = None;
    }
}

/// Whether the calling process currently holds the framebuffer.
pub(crate) fn holds() -> bool {
    let pid = thread::current_pid().expect("fb_holds called with no current process");
    let guard = DRIVER.lock();
    let driver = guard.as_ref().expect("gpu driver not initialized");
    driver.owner.as_ref() == Some(&pid)
}

/// Requires ownership; blocks the calling thread until the device reports completion. A no-op if
/// the caller does not currently hold the framebuffer.
pub(crate) fn transfer(cx: &mut ExceptionContext) {
    if !holds() {
        return;
    }
    submit_from_syscall(cx, GpuDriverImpl::fill_transfer);
}

/// Requires ownership; blocks the calling thread until the device reports completion. A no-op if
/// the caller does not currently hold the framebuffer.
pub(crate) fn flush(cx: &mut ExceptionContext) {
    if !holds() {
        return;
    }
    submit_from_syscall(cx, GpuDriverImpl::fill_flush);
}

/// Physical base address and byte length of the framebuffer, for the kernel's memory subsystem
/// to map read-write into the owning process (`fb_map`, implemented outside this driver).
pub(crate) fn framebuffer() -> (PhysicalAddress, usize) {
    framebuffer_region()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn control_header_defaults_are_zero_except_type() {
        let hdr = ControlHeader::new(CMD_RESOURCE_CREATE_2D);
        assert_eq!(hdr.type_, CMD_RESOURCE_CREATE_2D);
        assert_eq!(hdr.flags, 0);
        assert_eq!(hdr.fence_id, 0);
        assert_eq!(hdr.ctx_id, 0);
        assert_eq!(hdr.padding, 0);
    }

    #[test]
    fn extend_used_idx_handles_wraparound() {
        let regs_storage = 0u32;
        let _ = regs_storage;

        // Simulate a cursor that's already past the first 16-bit wrap.
        let mut driver_used_cursor: u32 = 0x1_0005;
        let candidate = {
            let hi = driver_used_cursor & !0xFFFF;
            let idx16: u16 = 0x0002;
            let candidate = hi | idx16 as u32;
            if candidate < driver_used_cursor {
                candidate.wrapping_add(0x1_0000)
            } else {
                candidate
            }
        };
        assert_eq!(candidate, 0x2_0002);
        driver_used_cursor = candidate;
        assert!(driver_used_cursor > 0x1_0005);
    }

    #[test]
    fn resource_create_2d_layout_matches_virtio_gpu_wire_format() {
        assert_eq!(core::mem::size_of::<ControlHeader>(), 24);
        assert_eq!(
            core::mem::size_of::<ResourceCreate2d>(),
            24 + 4 * core::mem::size_of::<u32>()
        );
    }
}
