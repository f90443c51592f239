//! One walking session: EXTEST on one part, SAMPLE/PRELOAD on another, walking zeros then
//! walking ones, reduced to a connectivity report.
//!
//! The operator (or a test) paces the session through a `Pacer`, which is asked before every
//! phase and every step whether to go on.  Stopping is not an error: `run` resets the chain and
//! hands back the steps completed so far.
use core::fmt;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::classify::{classify, ConnectivityReport, SessionSummary, StepRecord};
use crate::database::{PartDatabase, PartLocation, Resolution};
use crate::diff::{attribute, diff, ChangeRecord};
use crate::driver::JtagDriver;
use crate::error::{HardwareContext, WalkError};
use crate::idcode::IdCode;
use crate::part::PartDescription;
use crate::pinmap::PinMap;
use crate::vector::{LogicalVector, TransportVector};
use crate::walk::{baseline_vector, walk_steps, Level};

pub const EXTEST: &str = "EXTEST";
pub const SAMPLE: &str = "SAMPLE/PRELOAD";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Checkpoint {
    /// Both parts identified, nothing driven yet
    Setup,
    /// Before the baseline of a walk is applied
    Walk(Level),
    /// Before pin `index` of `total` is driven
    Step { level: Level, index: usize, total: usize },
    /// Both walks done, before classification
    Summary,
    /// A report was produced; asked before starting over
    NextSession,
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Checkpoint::Setup => f.write_str("start the test"),
            Checkpoint::Walk(level) => write!(f, "start {level}"),
            Checkpoint::Step { level, index, total } => {
                write!(f, "{level} step {} of {total}", index + 1)
            }
            Checkpoint::Summary => f.write_str("view the summary"),
            Checkpoint::NextSession => f.write_str("run another session"),
        }
    }
}

pub trait Pacer {
    fn checkpoint(&mut self, at: Checkpoint) -> ControlFlow<()>;
}

impl<F> Pacer for F
    where F: FnMut(Checkpoint) -> ControlFlow<()>
{
    fn checkpoint(&mut self, at: Checkpoint) -> ControlFlow<()> {
        self(at)
    }
}

/// Never waits.  Sessions run straight through.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPause;

impl Pacer for NoPause {
    fn checkpoint(&mut self, _at: Checkpoint) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

/// Stops at the first checkpoint after `flag` is raised, whatever `inner` says.  The flag is
/// checked again after `inner` returns, so raising it while an operator gate is waiting stops
/// the session at that same checkpoint.
pub struct Interruptible<P> {
    flag: Arc<AtomicBool>,
    inner: P,
}

impl<P: Pacer> Interruptible<P> {
    pub fn new(flag: Arc<AtomicBool>, inner: P) -> Self {
        Self { flag, inner }
    }

    fn raised(&self, at: Checkpoint) -> bool {
        let raised = self.flag.load(Ordering::SeqCst);
        if raised {
            info!(%at, "interrupted");
        }
        raised
    }
}

impl<P: Pacer> Pacer for Interruptible<P> {
    fn checkpoint(&mut self, at: Checkpoint) -> ControlFlow<()> {
        if self.raised(at) {
            return ControlFlow::Break(());
        }
        if self.inner.checkpoint(at).is_break() || self.raised(at) {
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }
}

/// A part taking part in the session
#[derive(Clone, Debug)]
pub struct DeviceSetup {
    pub position: usize,
    /// Operator's name for the part, used in logs and errors
    pub alias: String,
    pub pin_map: PinMap,
}

/// What `identify` learned about a part
#[derive(Clone, Debug)]
pub struct Identified {
    pub idcode: IdCode,
    pub location: PartLocation,
    pub device: DeviceSetup,
}

/// Read the IDCODE of the part at `position`, find and load its part file, and attach the
/// description to the driver.
pub fn identify<D: JtagDriver + ?Sized>(
    driver: &mut D,
    database: &PartDatabase,
    position: usize,
    alias: &str,
) -> Result<Identified, WalkError> {
    let idcode = driver
        .read_idcode(position)
        .map_err(|source| WalkError::DeviceNotFound { position, source })?;
    info!(
        alias,
        position,
        %idcode,
        stepping = %idcode.stepping(),
        part = %idcode.part(),
        manufacturer = %idcode.manufacturer(),
        "device info"
    );

    let location = match database.resolve(idcode)? {
        Resolution::Found(location) => location,
        Resolution::NotFound { table, key } => {
            return Err(WalkError::PartNotFound {
                alias: alias.to_string(),
                idcode,
                table,
                key,
            })
        }
    };
    info!(alias, file = %location.path.display(), "part file");

    let part = PartDescription::load(&location.path)?;
    let pin_map = part.pin_map().map_err(|source| WalkError::PinMap {
        alias: alias.to_string(),
        source,
    })?;
    debug!(alias, cells = pin_map.len(), drivers = pin_map.drivers().count(), "pin map");
    for cell in pin_map.iter() {
        debug!(
            alias,
            bit = cell.bit_index,
            pin = %cell.pin_name,
            direction = ?cell.direction,
            safe = ?cell.safe_value,
            control = ?cell.control_bit,
            disable = ?cell.disable_value,
            "cell"
        );
    }
    driver
        .attach_part(position, part)
        .map_err(|source| WalkError::DeviceNotFound { position, source })?;

    Ok(Identified {
        idcode,
        location,
        device: DeviceSetup {
            position,
            alias: alias.to_string(),
            pin_map,
        },
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed(ConnectivityReport),
    /// Stopped at a checkpoint; the steps completed before it
    Cancelled(SessionSummary),
}

fn load_instruction<D: JtagDriver + ?Sized>(
    driver: &mut D,
    device: &DeviceSetup,
    instruction: &str,
) -> Result<(), WalkError> {
    let context = || format!("{instruction} on {} (part {})", device.alias, device.position);
    driver.select_part(device.position).context(context)?;
    driver.set_instruction(instruction).context(context)
}

/// Shift the chain and read what `device` captured, in cell order
fn snapshot<D: JtagDriver + ?Sized>(driver: &mut D, device: &DeviceSetup) -> Result<LogicalVector, WalkError> {
    load_instruction(driver, device, SAMPLE)?;
    let context = || format!("sampling {} (part {})", device.alias, device.position);
    driver.shift_dr().context(context)?;
    Ok(driver.read_dr().context(context)?.into_logical())
}

fn apply<D: JtagDriver + ?Sized>(
    driver: &mut D,
    device: &DeviceSetup,
    vector: TransportVector,
    what: &str,
) -> Result<(), WalkError> {
    load_instruction(driver, device, EXTEST)?;
    let context = || format!("driving {what} on {} (part {})", device.alias, device.position);
    driver.push_dr(vector).context(context)?;
    driver.shift_dr().context(context)
}

fn log_changes(alias: &str, changes: &[ChangeRecord]) {
    for change in changes {
        match &change.pin_name {
            Some(_) => info!(alias, "{change}"),
            None => debug!(alias, "{change} (unnamed cell)"),
        }
    }
}

/// The register width `instruction` selects on `device` must match its pin map.
///
/// The width comes from the driver's pending buffer, not from a hardware measurement.  For a
/// `ScanChain` the boundary register is sized from the same part file as the pin map, so this
/// only catches an instruction that selects some other register (such as BYPASS) or a driver
/// that sizes the register differently.
fn check_width<D: JtagDriver + ?Sized>(
    driver: &mut D,
    device: &DeviceSetup,
    instruction: &str,
) -> Result<(), WalkError> {
    load_instruction(driver, device, instruction)?;
    let found = driver
        .dr_in()
        .context(|| format!("{instruction} on {}", device.alias))?
        .len();
    if found != device.pin_map.width() {
        return Err(WalkError::RegisterWidth {
            alias: device.alias.clone(),
            instruction: instruction.to_string(),
            expected: device.pin_map.width(),
            found,
        });
    }
    Ok(())
}

/// Owns everything a session touches: the chain, both parts and the running summary
pub struct SessionContext<D> {
    driver: D,
    extest: DeviceSetup,
    sample: DeviceSetup,
    summary: SessionSummary,
}

impl<D: JtagDriver> SessionContext<D> {
    pub fn new(driver: D, extest: DeviceSetup, sample: DeviceSetup) -> Self {
        Self {
            driver,
            extest,
            sample,
            summary: SessionSummary::new(),
        }
    }

    /// Identify both parts against `database` and build the session
    pub fn setup(
        mut driver: D,
        database: &PartDatabase,
        extest: (usize, &str),
        sample: (usize, &str),
    ) -> Result<Self, WalkError> {
        let extest = identify(&mut driver, database, extest.0, extest.1)?.device;
        let sample = identify(&mut driver, database, sample.0, sample.1)?.device;
        Ok(Self::new(driver, extest, sample))
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    pub fn extest(&self) -> &DeviceSetup {
        &self.extest
    }

    pub fn sample(&self) -> &DeviceSetup {
        &self.sample
    }

    fn cancel(&mut self, at: Checkpoint) -> SessionOutcome {
        info!(%at, steps = self.summary.len(), "session stopped");
        if let Err(err) = self.driver.reset() {
            warn!(%err, "chain reset failed");
        }
        SessionOutcome::Cancelled(core::mem::take(&mut self.summary))
    }

    /// Run both walks and classify them
    pub fn run<P: Pacer + ?Sized>(&mut self, pacer: &mut P) -> Result<SessionOutcome, WalkError> {
        // steps left over by a run that failed part way
        self.summary = SessionSummary::new();
        if pacer.checkpoint(Checkpoint::Setup).is_break() {
            return Ok(self.cancel(Checkpoint::Setup));
        }

        check_width(&mut self.driver, &self.sample, SAMPLE)?;
        check_width(&mut self.driver, &self.extest, EXTEST)?;
        // both baselines start from the same live register
        let live = self
            .driver
            .dr_in()
            .context(|| format!("{EXTEST} on {}", self.extest.alias))?;
        debug!(%live, "extest dr_in");

        for level in [Level::Zero, Level::One] {
            let at = Checkpoint::Walk(level);
            if pacer.checkpoint(at).is_break() {
                return Ok(self.cancel(at));
            }
            let baseline = baseline_vector(&self.extest.pin_map, &live, level)?;
            if let ControlFlow::Break(at) = self.walk(level, baseline, pacer)? {
                return Ok(self.cancel(at));
            }
        }

        if pacer.checkpoint(Checkpoint::Summary).is_break() {
            return Ok(self.cancel(Checkpoint::Summary));
        }
        let report = classify(&mut self.summary);
        info!(pins = report.len(), "summary");
        Ok(SessionOutcome::Completed(report))
    }

    fn walk<P: Pacer + ?Sized>(
        &mut self,
        level: Level,
        baseline: TransportVector,
        pacer: &mut P,
    ) -> Result<ControlFlow<Checkpoint>, WalkError> {
        let Self { driver, extest, sample, summary } = self;
        info!("{level}");
        debug!(%baseline, "baseline");

        apply(driver, extest, baseline.clone(), "the baseline")?;
        let mut observed_prev = snapshot(driver, sample)?;
        debug!(sample = %observed_prev, "initial sample");

        let baseline = baseline.into_logical();
        let steps = walk_steps(&extest.pin_map, &baseline, level)?;
        let total = steps.len();
        let mut driven_prev = baseline;

        for (index, step) in steps.into_iter().enumerate() {
            let at = Checkpoint::Step { level, index, total };
            if pacer.checkpoint(at).is_break() {
                return Ok(ControlFlow::Break(at));
            }
            info!(step = index + 1, total, pin = %step.pin_name, bit = step.bit_index, "{level}");

            apply(driver, extest, step.vector.clone().into_transport(), &step.pin_name)?;
            let driven = diff(&driven_prev, &step.vector, &extest.pin_map)?;
            log_changes(&extest.alias, &driven);
            driven_prev = step.vector;

            let observed_now = snapshot(driver, sample)?;
            let observed = diff(&observed_prev, &observed_now, &sample.pin_map)?;
            log_changes(&sample.alias, &observed);
            observed_prev = observed_now;

            summary.push(StepRecord {
                driver: attribute(&driven, level),
                observed: attribute(&observed, level),
            });
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Run sessions until `pacer` stops one, handing every report to `report`.  Returns the
    /// steps of the session that was stopped.
    pub fn run_until_stopped<P, F>(&mut self, pacer: &mut P, mut report: F) -> Result<SessionSummary, WalkError>
        where P: Pacer + ?Sized,
              F: FnMut(&ConnectivityReport)
    {
        loop {
            match self.run(pacer)? {
                SessionOutcome::Completed(r) => report(&r),
                SessionOutcome::Cancelled(summary) => return Ok(summary),
            }
            if pacer.checkpoint(Checkpoint::NextSession).is_break() {
                return Ok(self.cancel(Checkpoint::NextSession).into_summary());
            }
        }
    }
}

impl SessionOutcome {
    /// The partial summary of a stopped session, empty for a completed one
    pub fn into_summary(self) -> SessionSummary {
        match self {
            SessionOutcome::Completed(_) => SessionSummary::new(),
            SessionOutcome::Cancelled(summary) => summary,
        }
    }
}
