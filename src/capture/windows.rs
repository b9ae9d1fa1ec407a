//! Windows capture using a Win32 low-level keyboard hook
//!
//! Architecture:
//! - `start` runs on a dedicated thread: it installs `WH_KEYBOARD_LL` and pumps
//!   messages, which is what makes Windows call the hook at all
//! - The hook callback only filters and offers the key to the handoff; keys are
//!   always passed on to the next hook, never swallowed
//! - `stop` posts `WM_QUIT` to the pumping thread
//!
//! Key Win32 APIs:
//! - SetWindowsHookExW(WH_KEYBOARD_LL) / UnhookWindowsHookEx
//! - GetMessageW message pump, PostThreadMessageW(WM_QUIT) to end it

use super::{CaptureError, CaptureSource, KeyHandoff};
use crate::key::KeyCode;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::{debug, info, trace, warn};
use windows::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetMessageW, KBDLLHOOKSTRUCT, MSG, PM_NOREMOVE,
    PeekMessageW, PostThreadMessageW, SetWindowsHookExW, TranslateMessage, UnhookWindowsHookEx,
    WH_KEYBOARD_LL, WM_KEYDOWN, WM_QUIT, WM_SYSKEYDOWN,
};

// The hook callback receives no user data and always runs on the thread that
// installed the hook, so its context lives in a thread-local.
thread_local! {
    static HOOK: RefCell<Option<HookContext>> = const { RefCell::new(None) };
}

struct HookContext {
    allowed: Vec<KeyCode>,
    handoff: KeyHandoff,
}

/// Windows keyboard capture
#[derive(Debug, Default)]
pub struct Capture {
    /// Thread currently pumping messages for the hook, 0 when none
    thread_id: AtomicU32,
    stopped: AtomicBool,
}

impl Capture {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CaptureSource for Capture {
    fn start(&self, allowed: &[KeyCode], handoff: KeyHandoff) -> Result<(), CaptureError> {
        info!("initializing Windows keyboard hook");

        // Force creation of this thread's message queue so a WM_QUIT posted
        // by stop() before the pump starts is not lost.
        unsafe {
            let mut msg = MSG::default();
            let _ = PeekMessageW(&mut msg, None, 0, 0, PM_NOREMOVE);
        }
        self.thread_id
            .store(unsafe { GetCurrentThreadId() }, Ordering::SeqCst);
        if self.stopped.load(Ordering::SeqCst) {
            debug!("capture stopped before hook installation");
            self.thread_id.store(0, Ordering::SeqCst);
            return Ok(());
        }

        HOOK.with(|hook| {
            *hook.borrow_mut() = Some(HookContext {
                allowed: allowed.to_vec(),
                handoff,
            })
        });

        let result = run_hook_thread();

        HOOK.with(|hook| hook.borrow_mut().take());
        self.thread_id.store(0, Ordering::SeqCst);
        result
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let thread_id = self.thread_id.load(Ordering::SeqCst);
        if thread_id == 0 {
            return;
        }
        debug!(thread_id, "posting WM_QUIT to hook thread");
        if let Err(e) = unsafe { PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) } {
            warn!("failed to signal hook thread: {e}");
        }
    }
}

/// Runs the Win32 message pump - must be called from the hook's own thread
fn run_hook_thread() -> Result<(), CaptureError> {
    unsafe {
        let hook = SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_hook_proc), None, 0)
            .map_err(|e| CaptureError::Install(e.to_string()))?;

        info!("keyboard hook installed, starting message pump");

        // GetMessageW returns 0 for WM_QUIT and -1 on error
        let mut msg = MSG::default();
        while GetMessageW(&mut msg, None, 0, 0).0 > 0 {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }

        if let Err(e) = UnhookWindowsHookEx(hook) {
            warn!("failed to uninstall keyboard hook: {e}");
        }
        info!("keyboard hook uninstalled");
    }

    Ok(())
}

/// Low-level keyboard hook callback
/// SAFETY: Called by Windows from the message pump thread
unsafe extern "system" fn keyboard_hook_proc(
    code: i32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    // code < 0 means we must pass to next hook without processing
    if code >= 0 && matches!(wparam.0 as u32, WM_KEYDOWN | WM_SYSKEYDOWN) {
        let kb_struct = unsafe { &*(lparam.0 as *const KBDLLHOOKSTRUCT) };
        let key = KeyCode::new(kb_struct.vkCode);

        HOOK.with(|hook| {
            if let Ok(context) = hook.try_borrow()
                && let Some(context) = context.as_ref()
                && context.allowed.contains(&key)
            {
                trace!(%key, "hook received key down");
                context.handoff.offer(key);
            }
        });
    }

    unsafe { CallNextHookEx(None, code, wparam, lparam) }
}
