//! `define_service!`: declare a function-pointer service table.
//!
//! Several low-level crates (`lib`, `mm`) need to call into higher layers
//! (scheduler, drivers, platform) that in turn depend on them, which a plain
//! crate dependency edge can't express without a cycle. `define_service!`
//! breaks the cycle: it declares a plain `struct` of function pointers, a
//! [`crate::ServiceCell`] holding the registered `'static` instance, and a
//! free function per service method that forwards to it. The crate that
//! owns the real implementation builds one instance of the struct and
//! registers it during boot; everyone else just calls the free functions.
//!
//! ```ignore
//! define_service! {
//!     widgets => WidgetServices {
//!         spin(speed: u32);
//!         count() -> u32;
//!         @no_wrapper raw_ptr(id: u32) -> *mut u8;
//!     }
//! }
//! ```
//! expands to a `WidgetServices` struct, `register_widgets_services`,
//! `widgets_services()`, and free functions `spin`/`count` (but not
//! `raw_ptr`, marked `@no_wrapper` because its caller needs a hand-written
//! wrapper, e.g. to adapt the signature).

#[macro_export]
macro_rules! define_service {
    (
        $(#[$doc:meta])*
        $mod_name:ident => $struct_name:ident {
            $($body:tt)*
        }
    ) => {
        $crate::__service_struct! { $(#[$doc])* $struct_name [] $($body)* }
        $crate::__service_cell_and_getters! { $mod_name, $struct_name }
        $crate::__service_wrappers! { $mod_name, $struct_name, $($body)* }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __service_struct {
    ($(#[$doc:meta])* $struct_name:ident [$($fields:tt)*]
        @no_wrapper $fname:ident ( $($pname:ident : $pty:ty),* $(,)? ) -> $ret:ty ; $($rest:tt)*
    ) => {
        $crate::__service_struct! { $(#[$doc])* $struct_name [$($fields)* pub $fname: fn($($pty),*) -> $ret,] $($rest)* }
    };
    ($(#[$doc:meta])* $struct_name:ident [$($fields:tt)*]
        @no_wrapper $fname:ident ( $($pname:ident : $pty:ty),* $(,)? ) ; $($rest:tt)*
    ) => {
        $crate::__service_struct! { $(#[$doc])* $struct_name [$($fields)* pub $fname: fn($($pty),*),] $($rest)* }
    };
    ($(#[$doc:meta])* $struct_name:ident [$($fields:tt)*]
        $fname:ident ( $($pname:ident : $pty:ty),* $(,)? ) -> $ret:ty ; $($rest:tt)*
    ) => {
        $crate::__service_struct! { $(#[$doc])* $struct_name [$($fields)* pub $fname: fn($($pty),*) -> $ret,] $($rest)* }
    };
    ($(#[$doc:meta])* $struct_name:ident [$($fields:tt)*]
        $fname:ident ( $($pname:ident : $pty:ty),* $(,)? ) ; $($rest:tt)*
    ) => {
        $crate::__service_struct! { $(#[$doc])* $struct_name [$($fields)* pub $fname: fn($($pty),*),] $($rest)* }
    };
    ($(#[$doc:meta])* $struct_name:ident [$($fields:tt)*]) => {
        $(#[$doc])*
        #[derive(Clone, Copy)]
        pub struct $struct_name {
            $($fields)*
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __service_cell_and_getters {
    ($mod_name:ident, $struct_name:ident) => {
        $crate::paste::paste! {
            static [<$mod_name:upper _SERVICE_CELL>]: $crate::ServiceCell<$struct_name> =
                $crate::ServiceCell::new();

            #[inline(always)]
            pub fn [<register_ $mod_name _services>](svc: &'static $struct_name) {
                [<$mod_name:upper _SERVICE_CELL>].register(svc);
            }

            #[inline(always)]
            pub fn [<$mod_name _services>]() -> &'static $struct_name {
                [<$mod_name:upper _SERVICE_CELL>].get()
            }

            #[inline(always)]
            pub fn [<$mod_name _services_ready>]() -> bool {
                [<$mod_name:upper _SERVICE_CELL>].is_registered()
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __service_wrappers {
    ($mod_name:ident, $struct_name:ident,
        @no_wrapper $fname:ident ( $($pname:ident : $pty:ty),* $(,)? ) -> $ret:ty ; $($rest:tt)*
    ) => {
        $crate::__service_wrappers! { $mod_name, $struct_name, $($rest)* }
    };
    ($mod_name:ident, $struct_name:ident,
        @no_wrapper $fname:ident ( $($pname:ident : $pty:ty),* $(,)? ) ; $($rest:tt)*
    ) => {
        $crate::__service_wrappers! { $mod_name, $struct_name, $($rest)* }
    };
    ($mod_name:ident, $struct_name:ident,
        $fname:ident ( $($pname:ident : $pty:ty),* $(,)? ) -> $ret:ty ; $($rest:tt)*
    ) => {
        $crate::paste::paste! {
            #[inline(always)]
            pub fn $fname ( $($pname : $pty),* ) -> $ret {
                ([<$mod_name _services>]().$fname)($($pname),*)
            }
        }
        $crate::__service_wrappers! { $mod_name, $struct_name, $($rest)* }
    };
    ($mod_name:ident, $struct_name:ident,
        $fname:ident ( $($pname:ident : $pty:ty),* $(,)? ) ; $($rest:tt)*
    ) => {
        $crate::paste::paste! {
            #[inline(always)]
            pub fn $fname ( $($pname : $pty),* ) {
                ([<$mod_name _services>]().$fname)($($pname),*)
            }
        }
        $crate::__service_wrappers! { $mod_name, $struct_name, $($rest)* }
    };
    ($mod_name:ident, $struct_name:ident,) => {};
}
