/// Executor backed by host processes: the system C compiler and the
/// compiled program run as plain children of this process.
pub mod executor;
