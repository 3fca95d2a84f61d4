mod free_list;
pub use free_list::*;

mod frame_clock;
pub use frame_clock::*;

mod bench;
pub use bench::*;
