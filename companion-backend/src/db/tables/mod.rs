//! Collection operations - extends Database with typed methods per collection
//!
//! Each module adds `impl Database` blocks for one kernel collection.

mod contexts;    // contexts
mod friends;     // friends
mod meta;        // meta
mod module_data; // moduleData
mod timers;      // timers
