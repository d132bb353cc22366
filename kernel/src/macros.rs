/// Trace output for the fault path, compiled in with the `vm_debug` feature.
macro_rules! vm_debug {
    ($($arg:tt)*) => {{
        if cfg!(feature = "vm_debug") {
            vmos_shared::println!($($arg)*);
        }
    }};
}
