// Execution engine for the Ciphel runtime

use std::collections::VecDeque;

use tracing::{debug, trace, warn};

use crate::ast::{CommandOutcome, Program, Stmt};
use crate::host::{sp_as_energy, ChargeReason, CommandId, Host, MockHost};
use crate::interpreter::config::RuntimeConfig;
use crate::interpreter::cost;
use crate::interpreter::errors::RuntimeError;
use crate::interpreter::events::{EventRegistry, Mutation, QueuedEvent};
use crate::interpreter::ops::access::StackSlots;
use crate::memory::channel::Timeout;
use crate::memory::heap::Heap;
use crate::memory::instructions::{InstructionId, InstructionLog};
use crate::memory::scope::{ScopeArena, ScopeId, ScopeKind, GENERAL_SCOPE};
use crate::memory::value::{ErrorValue, HeapHandle, Value};
use crate::snapshot::{Checkpoint, Effect, Journal};

/// Non-local control transfer pending in the current scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControlFlow {
    Normal,
    Break,
    Continue,
    Return,
}

/// Result of [`Interpreter::step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Executed(InstructionId),
    /// An instruction is parked on a channel receive
    Suspended,
    /// No instruction left, or the program returned
    Finished,
}

/// Result of [`Interpreter::tick`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick budget was spent with instructions left
    Yielded,
    /// Waiting on a parked receive
    Waiting,
    Finished,
}

/// Result of [`Interpreter::run`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Finished,
    Suspended,
}

/// A top-level instruction waiting for channel data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parked {
    pub instruction: InstructionId,
    pub channel: HeapHandle,
    pub timeout: Timeout,
    /// Tick during which it first blocked. Re-parking after a resume keeps
    /// it, so the timeout counts from the first block.
    pub since: u64,
}

/// The Ciphel runtime: a tree-walking interpreter over committed instructions
pub struct Interpreter<H: Host = MockHost> {
    pub(crate) config: RuntimeConfig,
    pub(crate) host: H,

    pub(crate) scopes: ScopeArena,
    pub(crate) heap: Heap,
    pub(crate) instructions: InstructionLog,
    pub(crate) events: EventRegistry,
    pub(crate) event_queue: VecDeque<QueuedEvent>,

    /// Host effects of the running unit
    pub(crate) journal: Journal,

    /// Addresses handed out by `&` for stack variables
    pub(crate) stack_slots: StackSlots,

    pub(crate) control_flow: ControlFlow,
    pub(crate) return_value: Option<Value>,

    /// Errors tainting the branches currently executing (innermost last)
    pub(crate) taint: Vec<ErrorValue>,
    pub(crate) try_depth: usize,

    /// Greater than zero while nested inside a charged statement
    pub(crate) meter_depth: usize,
    pub(crate) reporting_suspended: usize,
    /// Depth of the event execution currently running (0 at top level)
    pub(crate) event_depth: usize,
    pub(crate) call_depth: usize,
    /// Greater than zero where a receive must not park
    pub(crate) nonblocking: usize,

    /// Platform results seen by the running top-level instruction
    pub(crate) platform_log: Option<Vec<Value>>,
    /// Results handed back instead of calling the host again
    pub(crate) platform_replay: VecDeque<Value>,

    /// Last instruction executed (or failed)
    cursor: Option<InstructionId>,
    parked: Option<Parked>,
    /// Platform results of the parked instruction's earlier attempts
    parked_platform: Vec<Value>,
    tick: u64,
    tick_spent: u64,
    terminated: bool,
}

impl<H: Host> Interpreter<H> {
    pub fn new(host: H, config: RuntimeConfig) -> Self {
        let heap = Heap::with_slot_limit(config.max_heap_slots);
        Interpreter {
            config,
            host,
            scopes: ScopeArena::new(),
            heap,
            instructions: InstructionLog::new(),
            events: EventRegistry::new(),
            event_queue: VecDeque::new(),
            journal: Journal::new(),
            stack_slots: StackSlots::new(),
            control_flow: ControlFlow::Normal,
            return_value: None,
            taint: Vec::new(),
            try_depth: 0,
            meter_depth: 0,
            reporting_suspended: 0,
            event_depth: 0,
            call_depth: 0,
            nonblocking: 0,
            platform_log: None,
            platform_replay: VecDeque::new(),
            cursor: None,
            parked: None,
            parked_platform: Vec::new(),
            tick: 0,
            tick_spent: 0,
            terminated: false,
        }
    }

    /// Commit every instruction of a program, in order
    pub fn load(&mut self, program: Program) -> Result<Vec<InstructionId>, RuntimeError> {
        program
            .instructions
            .into_iter()
            .map(|stmt| self.commit(stmt))
            .collect()
    }

    // ---- scheduling ----

    /// Execute the next general-scope instruction and drain the event queue
    pub fn step(&mut self) -> Result<StepOutcome, RuntimeError> {
        if self.terminated {
            return Ok(StepOutcome::Finished);
        }
        if self.parked.is_some() {
            return Ok(StepOutcome::Suspended);
        }
        let Some((id, stmt)) = self.instructions.next_after(self.cursor) else {
            return Ok(StepOutcome::Finished);
        };
        self.run_instruction(id, &stmt, None)
    }

    fn run_instruction(
        &mut self,
        id: InstructionId,
        stmt: &Stmt,
        resumed: Option<Parked>,
    ) -> Result<StepOutcome, RuntimeError> {
        trace!(instruction = %id, "dispatch");
        let checkpoint = self.checkpoint();
        // A resumed instruction runs again from the top; platform calls made
        // before it blocked get their earlier results instead of a second call
        self.platform_log = Some(Vec::new());
        if resumed.is_some() {
            self.platform_replay = std::mem::take(&mut self.parked_platform).into();
        }
        let result = self.execute_statement(stmt, GENERAL_SCOPE);
        let returned = self.control_flow == ControlFlow::Return;
        self.reset_transient();
        self.platform_replay.clear();
        let platform_results = self.platform_log.take().unwrap_or_default();

        match result {
            Ok(()) => {
                self.cursor = Some(id);
                if returned {
                    debug!(instruction = %id, "program returned");
                    self.terminated = true;
                }
                self.commit_unit()?;
                self.drain_events()?;
                Ok(StepOutcome::Executed(id))
            }
            Err(RuntimeError::Blocked { channel, timeout }) => {
                self.restore(checkpoint);
                let since = resumed.map_or(self.tick, |p| p.since);
                debug!(instruction = %id, %channel, "parked on receive");
                self.parked_platform = platform_results;
                self.parked = Some(Parked {
                    instruction: id,
                    channel,
                    timeout,
                    since,
                });
                Ok(StepOutcome::Suspended)
            }
            Err(err) => {
                self.restore(checkpoint);
                self.cursor = Some(id);
                warn!(instruction = %id, error = %err, "instruction failed");
                Err(err)
            }
        }
    }

    /// Advance the clock by one tick
    pub fn tick(&mut self) -> Result<TickOutcome, RuntimeError> {
        self.tick += 1;
        self.tick_spent = 0;

        if let Some(parked) = self.parked.take() {
            let ready = self
                .heap
                .channel(parked.channel)
                .map_or(true, |c| c.has_pending());
            if ready {
                if let Some(stmt) = self.instructions.get(parked.instruction).cloned() {
                    debug!(instruction = %parked.instruction, "resuming parked instruction");
                    if self.run_instruction(parked.instruction, &stmt, Some(parked))?
                        == StepOutcome::Suspended
                    {
                        return Ok(TickOutcome::Waiting);
                    }
                }
            } else {
                if let Timeout::Ticks(limit) = parked.timeout {
                    if self.tick - parked.since >= limit {
                        self.cursor = Some(parked.instruction);
                        self.parked_platform.clear();
                        warn!(instruction = %parked.instruction, "receive timed out");
                        return Err(RuntimeError::TimeoutError {
                            channel: parked.channel,
                            ticks: limit,
                        });
                    }
                }
                self.parked = Some(parked);
                return Ok(TickOutcome::Waiting);
            }
        }

        // At least one step per tick, whatever the budget
        loop {
            match self.step()? {
                StepOutcome::Executed(_) => {}
                StepOutcome::Suspended => return Ok(TickOutcome::Waiting),
                StepOutcome::Finished => return Ok(TickOutcome::Finished),
            }
            if self.tick_spent >= self.config.tick_budget {
                return Ok(TickOutcome::Yielded);
            }
        }
    }

    /// Tick until the program finishes or waits on a channel
    pub fn run(&mut self) -> Result<RunOutcome, RuntimeError> {
        loop {
            match self.tick()? {
                TickOutcome::Yielded => {}
                TickOutcome::Waiting => return Ok(RunOutcome::Suspended),
                TickOutcome::Finished => return Ok(RunOutcome::Finished),
            }
        }
    }

    // ---- host API ----

    /// Append an instruction to the general scope's log
    pub fn commit(&mut self, stmt: Stmt) -> Result<InstructionId, RuntimeError> {
        let id = self.instructions.commit(stmt);
        debug!(instruction = %id, "committed");
        self.host_unit(|this| this.report(Mutation::InstructionCommitted(id)))?;
        Ok(id)
    }

    /// Delete an instruction from the log
    pub fn revert(&mut self, id: InstructionId) -> Result<(), RuntimeError> {
        self.instructions
            .revert(id)
            .ok_or(RuntimeError::UnknownInstruction { id })?;
        if self.parked.is_some_and(|p| p.instruction == id) {
            self.parked = None;
            self.parked_platform.clear();
        }
        debug!(instruction = %id, "reverted");
        self.host_unit(|this| this.report(Mutation::InstructionReverted(id)))
    }

    /// Notify the runtime of a command outcome from the command log
    pub fn report_command(
        &mut self,
        outcome: CommandOutcome,
        command: CommandId,
    ) -> Result<(), RuntimeError> {
        self.host_unit(|this| this.report(Mutation::Command { outcome, command }))
    }

    /// Send on a channel from outside the program
    pub fn channel_send(&mut self, channel: HeapHandle, value: Value) -> Result<(), RuntimeError> {
        self.host_unit(|this| this.send_on(channel, value))
    }

    /// Run a host-initiated change as its own unit, then drain events
    fn host_unit(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<(), RuntimeError>,
    ) -> Result<(), RuntimeError> {
        let checkpoint = self.checkpoint();
        let result = f(self);
        self.reset_transient();
        match result {
            Ok(()) => {
                self.commit_unit()?;
                self.drain_events()
            }
            Err(err) => {
                self.restore(checkpoint);
                Err(err)
            }
        }
    }

    // ---- units, checkpoints, charging ----

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            scopes: self.scopes.clone(),
            heap: self.heap.clone(),
            events: self.events.clone(),
            event_queue: self.event_queue.clone(),
            stack_slots: self.stack_slots.clone(),
        }
    }

    pub(crate) fn restore(&mut self, checkpoint: Checkpoint) {
        debug!(dropped_effects = self.journal.len(), "rolling back to checkpoint");
        self.scopes = checkpoint.scopes;
        self.heap = checkpoint.heap;
        self.events = checkpoint.events;
        self.event_queue = checkpoint.event_queue;
        self.stack_slots = checkpoint.stack_slots;
        self.journal.discard();
    }

    /// Hand the journal to the host and report any ECR movement
    pub(crate) fn commit_unit(&mut self) -> Result<(), RuntimeError> {
        let before = self.host.ecr();
        let charged = self.journal.flush(&mut self.host);
        self.tick_spent = self.tick_spent.saturating_add(charged);
        let after = self.host.ecr();
        if before != after {
            self.report(Mutation::Ecr { before, after })?;
        }
        Ok(())
    }

    pub(crate) fn reset_transient(&mut self) {
        self.control_flow = ControlFlow::Normal;
        self.return_value = None;
        self.taint.clear();
        self.try_depth = 0;
        self.meter_depth = 0;
        self.reporting_suspended = 0;
        self.event_depth = 0;
        self.call_depth = 0;
        self.nonblocking = 0;
    }

    /// Energy as it will be once the journal is flushed
    fn effective_energy(&self) -> f64 {
        self.host
            .energy()
            .saturating_sub(sp_as_energy(self.journal.pending_charge())) as f64
    }

    pub(crate) fn charge(&mut self, sp: u64, reason: ChargeReason) -> Result<(), RuntimeError> {
        if sp == 0 {
            return Ok(());
        }
        let before = self.effective_energy();
        self.journal.record(Effect::Charge { sp, reason });
        trace!(sp, ?reason, "charge");
        let after = self.effective_energy();
        self.report(Mutation::Energy { before, after })
    }

    /// Run `f` in a fresh child scope that is dropped afterwards, even on error
    pub(crate) fn in_child_scope<T>(
        &mut self,
        parent: ScopeId,
        kind: ScopeKind,
        f: impl FnOnce(&mut Self, ScopeId) -> Result<T, RuntimeError>,
    ) -> Result<T, RuntimeError> {
        let scope = self.scopes.enter_child(parent, kind);
        let result = f(self, scope);
        self.scopes.exit(scope);
        self.stack_slots.forget_closed(&self.scopes);
        result
    }

    // ---- accessors ----

    /// Value of a general-scope variable
    pub fn general_var(&self, name: &str) -> Option<&Value> {
        self.scopes
            .binding(GENERAL_SCOPE, name)
            .ok()
            .map(|v| &v.value)
    }

    /// Static casm weight of a committed instruction, as charged right now
    pub fn instruction_weight(&self, id: InstructionId) -> Option<u64> {
        let stmt = self.instructions.get(id)?;
        Some(cost::stmt_weight(stmt, &self.callee_weights(GENERAL_SCOPE)))
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn scopes(&self) -> &ScopeArena {
        &self.scopes
    }

    pub fn events(&self) -> &EventRegistry {
        &self.events
    }

    pub fn instructions(&self) -> &InstructionLog {
        &self.instructions
    }

    pub fn pending_events(&self) -> usize {
        self.event_queue.len()
    }

    pub fn cursor(&self) -> Option<InstructionId> {
        self.cursor
    }

    pub fn parked(&self) -> Option<&Parked> {
        self.parked.as_ref()
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}
