/// Native module contains implementations of core traits that spawn
/// processes directly on the host, without any sandbox in between.
pub mod process;
