pub mod consts;
pub mod convert;
pub mod correct;
pub mod error;
pub mod frame;
pub mod io;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod stats;
