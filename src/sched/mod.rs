//! Round-robin scheduler.
//!
//! The PIT tick rotates execution across the three terminals' active
//! processes. Only terminals whose base shell has launched participate; with
//! nothing else launched the current terminal keeps running. The actual
//! stack switch is the one cooperative suspension point in the kernel.

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::terminal::{self, NUM_TERMINALS};

/// Terminal currently being executed (not necessarily the visible one).
static CURR_IDX: AtomicUsize = AtomicUsize::new(0);

/// Saved schedule index, restored when a first shell launch fails.
static RESTORE_CURR_IDX: AtomicUsize = AtomicUsize::new(0);

pub fn current_terminal() -> usize {
    CURR_IDX.load(Ordering::SeqCst)
}

pub fn set_current_terminal(term: usize) {
    CURR_IDX.store(term, Ordering::SeqCst);
}

/// Remember the schedule index before a first launch redirects it.
pub fn save_restore_point() {
    RESTORE_CURR_IDX.store(CURR_IDX.load(Ordering::SeqCst), Ordering::SeqCst);
}

/// Undo a redirected schedule index after a failed first launch.
pub fn restore_current_terminal() {
    CURR_IDX.store(RESTORE_CURR_IDX.load(Ordering::SeqCst), Ordering::SeqCst);
}

/// Pick the next launched terminal after `curr`, wrapping; `curr` itself if
/// no other terminal has launched.
pub fn next_scheduled(launched: [bool; NUM_TERMINALS], curr: usize) -> usize {
    let mut candidate = (curr + 1) % NUM_TERMINALS;
    while candidate != curr {
        if launched[candidate] {
            return candidate;
        }
        candidate = (candidate + 1) % NUM_TERMINALS;
    }
    curr
}

/// Program the PIT and start rotating.
pub fn init() {
    CURR_IDX.store(0, Ordering::SeqCst);
    crate::drivers::pit::init();
    log::info!(target: "sched", "round-robin over {} terminals", NUM_TERMINALS);
}

/// One PIT tick: save the outgoing process's kernel context, pick the next
/// launched terminal, restore its mapping, video aliasing, esp0 and kernel
/// context. Runs with interrupts disabled (interrupt gate).
pub fn tick() {
    let curr = current_terminal();

    struct Switch {
        old_pid: crate::process::Pid,
        next_pid: crate::process::Pid,
        user_vidmem: u32,
        video_phys: u32,
    }

    let plan = terminal::with_terminals(|terms| {
        let old_pid = terms[curr].current_process?;
        let launched = [
            terms[0].has_been_launched,
            terms[1].has_been_launched,
            terms[2].has_been_launched,
        ];
        let next = next_scheduled(launched, curr);
        let next_pid = terms[next].current_process?;
        set_current_terminal(next);
        let video_phys = if terms[next].is_visible {
            crate::mm::VIDEO_MEMORY
        } else {
            terms[next].vidmem_addr as u32
        };
        Some(Switch {
            old_pid,
            next_pid,
            user_vidmem: terms[next].user_vidmem_addr,
            video_phys,
        })
    });

    let Some(plan) = plan else { return };

    crate::arch::set_kernel_stack(crate::process::kernel_stack_top(plan.next_pid));
    crate::mm::paging::map_task(crate::mm::MB128, crate::process::image_physical(plan.next_pid));
    crate::mm::paging::map_vidmem(plan.user_vidmem, plan.video_phys);

    if plan.next_pid == plan.old_pid {
        // Alone on the schedule; the interrupt return resumes us directly.
        return;
    }

    let Some(old) = crate::process::pcb_mut(plan.old_pid) else {
        return;
    };
    let Some(new) = crate::process::pcb_mut(plan.next_pid) else {
        return;
    };
    let (new_esp, new_ebp) = (new.esp, new.ebp);
    // SAFETY: both PCBs are live table slots; the new context was saved by a
    // previous tick on the incoming process's own kernel stack, and we hold
    // no locks across the switch.
    unsafe {
        crate::arch::context::switch_context(&mut old.esp, &mut old.ebp, new_esp, new_ebp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_covers_launched_terminals_in_order() {
        let all = [true, true, true];
        assert_eq!(next_scheduled(all, 0), 1);
        assert_eq!(next_scheduled(all, 1), 2);
        assert_eq!(next_scheduled(all, 2), 0);

        // Three ticks bring the rotation back around.
        let mut curr = 0;
        let mut seen = Vec::new();
        for _ in 0..3 {
            curr = next_scheduled(all, curr);
            seen.push(curr);
        }
        assert_eq!(seen, vec![1, 2, 0]);
    }

    #[test]
    fn unlaunched_terminals_are_skipped() {
        assert_eq!(next_scheduled([true, false, true], 0), 2);
        assert_eq!(next_scheduled([true, false, true], 2), 0);
        assert_eq!(next_scheduled([true, true, false], 1), 0);
    }

    #[test]
    fn a_lone_terminal_keeps_the_schedule() {
        assert_eq!(next_scheduled([true, false, false], 0), 0);
        // Even a stale index stays put when nothing else launched.
        assert_eq!(next_scheduled([false, false, false], 1), 1);
    }
}
