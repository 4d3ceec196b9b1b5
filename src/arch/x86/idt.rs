// Interrupt Descriptor Table (32-bit).
//
// 256 vectors: the 20 named CPU exceptions (vector 15 reserved), a default
// handler everywhere else, and overrides for the PIT, keyboard, RTC, mouse
// and the software syscall gate at 0x80. Vectors 0..31 are trap gates, the
// rest interrupt gates; only the syscall gate is reachable from ring 3.

use core::arch::{asm, naked_asm};
use core::mem::size_of;

use lazy_static::lazy_static;

use super::gdt::{KERNEL_CS, KERNEL_DS};
use crate::drivers;

/// Stack frame pushed by the CPU on interrupt entry. `esp`/`ss` follow only
/// when the interrupt crossed from ring 3; handlers never read past eflags.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct InterruptStackFrame {
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
}

const PRESENT: u8 = 0x80;
const DPL_USER: u8 = 0x60;
const TRAP_GATE_32: u8 = 0x0F;
const INT_GATE_32: u8 = 0x0E;

pub const PIT_VECTOR: usize = 0x20;
pub const KEYBOARD_VECTOR: usize = 0x21;
pub const RTC_VECTOR: usize = 0x28;
pub const MOUSE_VECTOR: usize = 0x2C;
pub const SYSCALL_VECTOR: usize = 0x80;

#[derive(Clone, Copy)]
#[repr(C)]
struct IdtEntry {
    offset_low: u16,
    selector: u16,
    zero: u8,
    type_attr: u8,
    offset_high: u16,
}

impl IdtEntry {
    const fn missing() -> Self {
        Self {
            offset_low: 0,
            selector: 0,
            zero: 0,
            type_attr: 0,
            offset_high: 0,
        }
    }

    fn new(handler: u32, type_attr: u8) -> Self {
        Self {
            offset_low: handler as u16,
            selector: KERNEL_CS,
            zero: 0,
            type_attr,
            offset_high: (handler >> 16) as u16,
        }
    }
}

fn trap(handler: extern "x86-interrupt" fn(InterruptStackFrame)) -> IdtEntry {
    IdtEntry::new(handler as usize as u32, PRESENT | TRAP_GATE_32)
}

fn interrupt(handler: extern "x86-interrupt" fn(InterruptStackFrame)) -> IdtEntry {
    IdtEntry::new(handler as usize as u32, PRESENT | INT_GATE_32)
}

#[repr(C, packed)]
struct DescriptorTablePointer {
    limit: u16,
    base: u32,
}

#[repr(transparent)]
struct InterruptTable([IdtEntry; 256]);

// SAFETY: the table is written once inside lazy_static initialization and
// only read afterwards (by the CPU and by load()).
unsafe impl Sync for InterruptTable {}

impl InterruptTable {
    fn load(&'static self) {
        let pointer = DescriptorTablePointer {
            limit: size_of::<[IdtEntry; 256]>() as u16 - 1,
            base: self as *const _ as u32,
        };
        // SAFETY: the pointer references a 'static table whose entries all
        // target kernel code; lidt itself has no other effect.
        unsafe {
            asm!(
                "lidt [{}]",
                in(reg) core::ptr::addr_of!(pointer),
                options(readonly, nostack, preserves_flags)
            );
        }
    }
}

lazy_static! {
    static ref IDT: InterruptTable = {
        let mut idt = InterruptTable([IdtEntry::missing(); 256]);

        // Defaults: traps below 32, interrupts above, all squashing.
        for vector in 0..32 {
            idt.0[vector] = trap(general_interrupt);
        }
        for vector in 32..256 {
            idt.0[vector] = interrupt(general_interrupt);
        }

        idt.0[0] = trap(divide_error_exception);
        idt.0[1] = trap(debug_exception);
        idt.0[2] = trap(nmi_interrupt);
        idt.0[3] = trap(breakpoint_exception);
        idt.0[4] = trap(overflow_exception);
        idt.0[5] = trap(bound_range_exceeded_exception);
        idt.0[6] = trap(invalid_opcode_exception);
        idt.0[7] = trap(device_not_available_exception);
        idt.0[8] = trap(double_fault_exception);
        idt.0[9] = trap(coprocessor_segment_overrun);
        idt.0[10] = trap(invalid_tss_exception);
        idt.0[11] = trap(segment_not_present);
        idt.0[12] = trap(stack_fault_exception);
        idt.0[13] = trap(general_protection_exception);
        idt.0[14] = trap(page_fault_exception);
        // Vector 15 is reserved by Intel; the default trap stays.
        idt.0[16] = trap(x87_floating_point_error);
        idt.0[17] = trap(alignment_check_exception);
        idt.0[18] = trap(machine_check_exception);
        idt.0[19] = trap(simd_floating_point_exception);

        idt.0[PIT_VECTOR] = interrupt(drivers::pit::pit_interrupt);
        idt.0[KEYBOARD_VECTOR] = interrupt(drivers::keyboard::keyboard_interrupt);
        idt.0[RTC_VECTOR] = interrupt(drivers::rtc::rtc_interrupt);
        idt.0[MOUSE_VECTOR] = interrupt(drivers::mouse::mouse_interrupt);

        idt.0[SYSCALL_VECTOR] = IdtEntry::new(
            syscall_entry as extern "C" fn() as usize as u32,
            PRESENT | DPL_USER | INT_GATE_32,
        );

        idt
    };
}

pub fn init() {
    IDT.load();
}

// ---------------------------------------------------------------------------
// Exception handlers
// ---------------------------------------------------------------------------

macro_rules! exception_handler {
    ($name:ident, $message:expr) => {
        extern "x86-interrupt" fn $name(_frame: InterruptStackFrame) {
            println!($message);
            crate::process::exception_squash();
        }
    };
}

exception_handler!(general_interrupt, "GENERAL_INTERRUPT");
exception_handler!(divide_error_exception, "DIVIDE_ERROR_EXCEPTION");
exception_handler!(debug_exception, "DEBUG_EXCEPTION");
exception_handler!(nmi_interrupt, "NMI_INTERRUPT");
exception_handler!(breakpoint_exception, "BREAKPOINT_EXCEPTION");
exception_handler!(overflow_exception, "OVERFLOW_EXCEPTION");
exception_handler!(bound_range_exceeded_exception, "BOUND_RANGE_EXCEEDED_EXCEPTION");
exception_handler!(invalid_opcode_exception, "INVALID_OPCODE_EXCEPTION");
exception_handler!(device_not_available_exception, "DEVICE_NOT_AVAILABLE_EXCEPTION");
exception_handler!(double_fault_exception, "DOUBLE_FAULT_EXCEPTION");
exception_handler!(coprocessor_segment_overrun, "COPROCESSOR_SEGMENT_OVERRUN");
exception_handler!(invalid_tss_exception, "INVALID_TSS_EXCEPTION");
exception_handler!(segment_not_present, "SEGMENT_NOT_PRESENT");
exception_handler!(stack_fault_exception, "STACK_FAULT_EXCEPTION");
exception_handler!(general_protection_exception, "GENERAL_PROTECTION_EXCEPTION");
exception_handler!(page_fault_exception, "PAGE_FAULT_EXCEPTION");
exception_handler!(x87_floating_point_error, "X87_FPU_FLOATING_POINT_ERROR");
exception_handler!(alignment_check_exception, "ALIGNMENT_CHECK_EXCEPTION");
exception_handler!(machine_check_exception, "MACHINE_CHECK_EXCEPTION");
exception_handler!(simd_floating_point_exception, "SIMD_FLOATING_POINT_EXCEPTION");

/// Terminal failure path for faults taken with no user process to squash:
/// mask every device line and halt.
pub fn error_hang() -> ! {
    drivers::pic::disable_irq(drivers::pit::PIT_IRQ);
    drivers::pic::disable_irq(drivers::keyboard::KEYBOARD_IRQ);
    drivers::pic::disable_irq(drivers::rtc::RTC_IRQ);
    drivers::pic::disable_irq(drivers::mouse::MOUSE_IRQ);
    crate::arch::halt_loop();
}

// ---------------------------------------------------------------------------
// Syscall gate
// ---------------------------------------------------------------------------

/// Software-interrupt trampoline for vector 0x80.
///
/// Convention: EAX = call number, EBX/ECX/EDX = arguments, result in EAX.
/// All other registers are preserved. The gate is an interrupt gate, so the
/// dispatcher runs with interrupts disabled until it chooses otherwise.
#[unsafe(naked)]
extern "C" fn syscall_entry() {
    naked_asm!(
        // pushad leaves EAX at [esp+28]; the two segment pushes below move
        // it to [esp+36] (EBX +24, ECX +32, EDX +28).
        "pushad",
        "push ds",
        "push es",
        "mov ax, {kernel_ds}",
        "mov ds, ax",
        "mov es, ax",
        "mov eax, [esp + 36]",
        "mov ebx, [esp + 24]",
        "mov ecx, [esp + 32]",
        "mov edx, [esp + 28]",
        "push edx",
        "push ecx",
        "push ebx",
        "push eax",
        "call {dispatch}",
        "add esp, 16",
        // Return value replaces the saved EAX restored by popad.
        "mov [esp + 36], eax",
        "pop es",
        "pop ds",
        "popad",
        "iretd",
        kernel_ds = const KERNEL_DS,
        dispatch = sym crate::syscall::dispatch_raw,
    );
}
