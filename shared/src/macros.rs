#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {{
        $crate::console::_print(format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! println {
    () => {{
        $crate::console::_print(format_args!("\n"));
    }};
    ($($arg:tt)*) => {{
        $crate::console::_print(format_args!("{}\n", format_args!($($arg)*)));
    }};
}

#[macro_export]
macro_rules! eprint {
    ($($arg:tt)*) => {{
        $crate::console::_eprint(format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! eprintln {
    () => {{
        $crate::console::_eprint(format_args!("\n"));
    }};
    ($($arg:tt)*) => {{
        $crate::console::_eprint(format_args!("{}\n", format_args!($($arg)*)));
    }};
}
