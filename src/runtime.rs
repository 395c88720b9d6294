// runtime.rs - Host functions called from generated code
//
// Generated code keeps the evaluation stack as a chain of 16-byte cells
// hanging off a fixed head cell. Cells are allocated and released through
// the helpers below; printing and underflow reporting go through them too.
// Accounting is per thread so independent sessions do not see each other.

#![allow(clippy::not_unsafe_ptr_arg_deref)]

use std::alloc::{self, Layout};
use std::cell::{Cell, RefCell};
use std::io::{self, Write};

/// Size of one stack cell: f64 value, then the pointer to the next cell.
pub const CELL_SIZE: usize = 16;
pub const CELL_ALIGN: usize = 8;
pub const VALUE_OFFSET: i32 = 0;
pub const NEXT_OFFSET: i32 = 8;

pub const ALLOC_SYMBOL: &str = "rpn_cell_alloc";
pub const FREE_SYMBOL: &str = "rpn_cell_free";
pub const PRINT_SYMBOL: &str = "rpn_print_f64";
pub const UNDERFLOW_SYMBOL: &str = "rpn_stack_underflow";

thread_local! {
    static LIVE_CELLS: Cell<i64> = const { Cell::new(0) };
    static UNDERFLOW: Cell<bool> = const { Cell::new(false) };
    static CAPTURE: RefCell<Option<String>> = const { RefCell::new(None) };
}

fn cell_layout() -> Layout {
    Layout::new::<[u64; 2]>()
}

// ============================================================================
// HELPERS (called from JIT-compiled code)
// ============================================================================

/// Allocate one uninitialised stack cell.
#[unsafe(no_mangle)]
pub extern "C" fn rpn_cell_alloc() -> *mut u8 {
    let layout = cell_layout();
    let cell = unsafe { alloc::alloc(layout) };
    if cell.is_null() {
        alloc::handle_alloc_error(layout);
    }
    LIVE_CELLS.with(|live| live.set(live.get() + 1));
    cell
}

/// Release a cell obtained from `rpn_cell_alloc`.
#[unsafe(no_mangle)]
pub extern "C" fn rpn_cell_free(cell: *mut u8) {
    if cell.is_null() {
        return;
    }
    unsafe { alloc::dealloc(cell, cell_layout()) };
    LIVE_CELLS.with(|live| live.set(live.get() - 1));
}

/// `.` and `.s`: print one number, printf("%f\n") style.
#[unsafe(no_mangle)]
pub extern "C" fn rpn_print_f64(value: f64) {
    let mut text = format_number(value);
    text.push('\n');

    let captured = CAPTURE.with(|capture| match capture.borrow_mut().as_mut() {
        Some(buffer) => {
            buffer.push_str(&text);
            true
        }
        None => false,
    });

    if !captured {
        let mut stdout = io::stdout();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }
}

/// A word found fewer cells than it needs. The word leaves the stack alone.
#[unsafe(no_mangle)]
pub extern "C" fn rpn_stack_underflow() {
    UNDERFLOW.with(|flag| flag.set(true));
}

/// Name/address pairs to hand to the JIT linker.
pub fn symbols() -> [(&'static str, *const u8); 4] {
    [
        (ALLOC_SYMBOL, rpn_cell_alloc as *const u8),
        (FREE_SYMBOL, rpn_cell_free as *const u8),
        (PRINT_SYMBOL, rpn_print_f64 as *const u8),
        (UNDERFLOW_SYMBOL, rpn_stack_underflow as *const u8),
    ]
}

// ============================================================================
// ACCOUNTING
// ============================================================================

/// Cells allocated and not yet released on this thread.
pub fn live_cells() -> i64 {
    LIVE_CELLS.with(|live| live.get())
}

/// Read and clear the underflow flag.
pub fn take_underflow() -> bool {
    UNDERFLOW.with(|flag| flag.replace(false))
}

/// Run `f` with number output collected instead of written to stdout.
pub fn capture<R>(f: impl FnOnce() -> R) -> (R, String) {
    let outer = CAPTURE.with(|capture| capture.replace(Some(String::new())));
    let result = f();
    let output = CAPTURE.with(|capture| capture.replace(outer)).unwrap_or_default();
    (result, output)
}

/// C's `%f`: six decimals, with `inf`/`nan` spelled the C way.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        if value.is_sign_negative() { "-nan".to_string() } else { "nan".to_string() }
    } else if value.is_infinite() {
        if value < 0.0 { "-inf".to_string() } else { "inf".to_string() }
    } else {
        format!("{:.6}", value)
    }
}
