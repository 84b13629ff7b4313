// Constants for the Ciphel runtime

/// Starting address for heap buffers
/// Heap addresses start at 0x10000000 to clearly distinguish them from stack addresses
pub const HEAP_ADDRESS_START: u64 = 0x1000_0000;

/// Bytes occupied by one heap slot
pub const HEAP_SLOT_SIZE: u64 = 8;

/// Starting address for stack variable addresses
/// Stack addresses start at 0x00000004
pub const STACK_ADDRESS_START: u64 = 0x0000_0004;

/// Bytes reserved per addressed stack variable
pub const STACK_SLOT_SIZE: u64 = 8;

/// Slots a single vector or map buffer may occupy
pub const DEFAULT_MAX_HEAP_SLOTS: usize = 1 << 20;

/// Elements a range may produce when used as a value
pub const DEFAULT_MAX_RANGE_LEN: u64 = 1 << 16;

/// Weighted sp executed per tick
pub const DEFAULT_TICK_BUDGET: u64 = 100;

/// Deepest event cascade allowed
pub const DEFAULT_MAX_EVENT_DEPTH: usize = 16;

/// sp charged per slot of a reallocated heap buffer
pub const DEFAULT_GROWTH_PENALTY_PER_SLOT: u64 = 1;

/// Cost of Errors produced by the engine itself (division by zero, overflow)
pub const DEFAULT_ERROR_COST: u64 = 1;

pub const DEFAULT_MAX_LOOP_ITERATIONS: u64 = 1_000_000;

pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// Fixed cost of a platform API call
pub const PLATFORM_CALL_WEIGHT: u64 = 10;

/// A call site is charged one tenth (rounded up) of the callee's body weight
pub const CALL_WEIGHT_DIVISOR: u64 = 10;
