pub extern crate alloc;

pub use crate::collections::{
    flat_map::{self, FlatMap},
    intrusive_list::{IntrusiveItem, IntrusiveList},
    ring_buffer::{self, RingBuffer},
    OwnedMutPtr, OwnedPtr,
};
pub use crate::{error, log_debug, log_error, log_info, log_verbose, log_warning, print, println};

pub use alloc::{
    boxed::Box,
    string::{String, ToString},
    sync::Arc,
    vec,
    vec::Vec,
};
