use crate::report::LogSink;

use super::NodeScheduler;

/// Primes the circuits with one boot power cycle, then duty-cycles forever.
///
/// The scheduler blocks on `embassy_time::Delay` between steps and never
/// yields; keep it the only task on this executor.
#[embassy_executor::task]
pub async fn run(mut scheduler: NodeScheduler, mut sink: LogSink) -> ! {
    let period = scheduler
        .config()
        .cycle_period(scheduler.channels().len())
        .as_millis();
    defmt::info!(
        "sensor: priming, cycle period {=u64} ms",
        u64::try_from(period).unwrap_or(u64::MAX)
    );
    scheduler.prime();
    scheduler.run(&mut sink)
}
