//! The three audited control transfers (32-bit).
//!
//! Every frame layout below is cdecl: arguments on the stack, return value
//! in EAX, EBX/ESI/EDI/EBP callee-saved.

use core::arch::naked_asm;

/// Enter ring 3 at `entry` with the user stack at `user_stack`, first
/// capturing the kernel continuation into `*saved_esp`/`*saved_ebp`.
///
/// Does not return on the forward path. When the started process (or one of
/// its descendants' halts, transitively) unwinds with [`resume_from_halt`]
/// against the same saved pair, this call returns carrying the status that
/// was passed there.
///
/// # Safety
/// - `entry`/`user_stack` must lie inside the currently mapped user image.
/// - `saved_esp`/`saved_ebp` must stay valid and untouched until the resume.
/// - The TSS `esp0` must already point at this process's kernel stack.
#[unsafe(naked)]
pub unsafe extern "C" fn jump_to_user(
    _entry: u32,
    _user_stack: u32,
    _saved_esp: *mut u32,
    _saved_ebp: *mut u32,
) -> u32 {
    naked_asm!(
        // Preserve callee-saved registers, then record the continuation.
        // After the three pushes the arguments sit at ESP+16..ESP+28.
        "push ebx",
        "push esi",
        "push edi",
        "mov eax, [esp + 24]", // saved_esp
        "mov [eax], esp",
        "mov eax, [esp + 28]", // saved_ebp
        "mov [eax], ebp",
        // Stage the IRET frame: SS, ESP, EFLAGS(IF), CS, EIP.
        "mov ecx, [esp + 20]", // user stack top
        "mov edx, [esp + 16]", // entry point
        "mov ax, 0x2B",
        "mov ds, ax",
        "mov es, ax",
        "push 0x2B",
        "push ecx",
        "pushfd",
        "pop eax",
        "or eax, 0x200",
        "push eax",
        "push 0x23",
        "push edx",
        "iretd",
        // resume_from_halt lands here with EAX already holding the status.
        ".global __trident_halt_landing",
        "__trident_halt_landing:",
        "pop edi",
        "pop esi",
        "pop ebx",
        "ret",
    );
}

/// Unwind a finished process back into the `jump_to_user` call that created
/// it, making that call return `status`.
///
/// # Safety
/// `esp`/`ebp` must be the exact pair captured by the matching
/// [`jump_to_user`], and that kernel stack must still be intact.
#[unsafe(naked)]
pub unsafe extern "C" fn resume_from_halt(_status: u32, _esp: u32, _ebp: u32) -> ! {
    naked_asm!(
        "mov eax, [esp + 4]",  // status -> return value
        "mov ecx, [esp + 8]",  // saved esp
        "mov ebp, [esp + 12]", // saved ebp
        "mov esp, ecx",
        "jmp __trident_halt_landing",
    );
}

/// Cooperative kernel-stack switch for the scheduler tick.
///
/// Saves the current continuation into `*old_esp`/`*old_ebp` and resumes the
/// continuation previously saved as `new_esp`/`new_ebp`. Control returns
/// here (for the old context) when a later tick switches back.
///
/// # Safety
/// - `new_esp`/`new_ebp` must be a pair previously captured by this function
///   on a live kernel stack.
/// - Must run with interrupts disabled; the caller must hold no locks.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(
    _old_esp: *mut u32,
    _old_ebp: *mut u32,
    _new_esp: u32,
    _new_ebp: u32,
) {
    naked_asm!(
        // After the four pushes the arguments sit at ESP+20..ESP+32.
        "push ebp",
        "push ebx",
        "push esi",
        "push edi",
        "mov eax, [esp + 20]", // old_esp
        "mov [eax], esp",
        "mov eax, [esp + 24]", // old_ebp
        "mov [eax], ebp",
        "mov ecx, [esp + 28]", // new_esp
        "mov edx, [esp + 32]", // new_ebp
        "mov esp, ecx",
        "mov ebp, edx",
        "pop edi",
        "pop esi",
        "pop ebx",
        "pop ebp",
        "ret",
    );
}
