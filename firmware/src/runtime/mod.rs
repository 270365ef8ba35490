use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_stm32::i2c::{self, I2c};
use embassy_stm32::time::Hertz;
use embassy_time::Delay;

use node_core::bus::I2cTransport;
use node_core::channels::ChannelList;
use node_core::power::{HalLines, LineLevel, PowerSequencer};
use node_core::scheduler::{DutyCycleConfig, DutyCycleScheduler};

use crate::board::{
    I2C_FREQUENCY_HZ, LINE_LABELS, MANAGED_LINE_COUNT, POWER_LINE_INDEX, POWER_POLARITY,
    TracedLines, initial_level,
};
use crate::report::LogSink;

mod sensor_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

const fn gpio_level(level: LineLevel) -> Level {
    match level {
        LineLevel::Low => Level::Low,
        LineLevel::High => Level::High,
    }
}

pub(super) type ManagedLines = TracedLines<HalLines<Output<'static>, MANAGED_LINE_COUNT>>;
pub(super) type SensorBus = I2cTransport<I2c<'static, hal::mode::Blocking>>;
pub(super) type NodeScheduler = DutyCycleScheduler<'static, ManagedLines, SensorBus, Delay>;

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA0,
        PA1,
        PA2,
        PA3,
        PA4,
        PA5,
        PA6,
        PA7,
        PB0,
        PB1,
        PB2,
        PB3,
        PB4,
        PB5,
        PB8,
        PB9,
        I2C1,
        ..
    } = hal::init(config);

    let pins = [
        Output::new(PA0, gpio_level(initial_level(0)), Speed::Low),
        Output::new(PA1, gpio_level(initial_level(1)), Speed::Low),
        Output::new(PA2, gpio_level(initial_level(2)), Speed::Low),
        Output::new(PA3, gpio_level(initial_level(3)), Speed::Low),
        Output::new(PA4, gpio_level(initial_level(4)), Speed::Low),
        Output::new(PA5, gpio_level(initial_level(5)), Speed::Low),
        Output::new(PA6, gpio_level(initial_level(6)), Speed::Low),
        Output::new(PA7, gpio_level(initial_level(7)), Speed::Low),
        Output::new(PB0, gpio_level(initial_level(8)), Speed::Low),
        Output::new(PB1, gpio_level(initial_level(9)), Speed::Low),
        Output::new(PB2, gpio_level(initial_level(10)), Speed::Low),
        Output::new(PB3, gpio_level(initial_level(11)), Speed::Low),
        Output::new(PB4, gpio_level(initial_level(12)), Speed::Low),
        Output::new(PB5, gpio_level(initial_level(13)), Speed::Low),
    ];
    let lines = HalLines::new(pins, POWER_LINE_INDEX).expect("power line index within pin table");
    let power = PowerSequencer::new(TracedLines::new(lines, POWER_POLARITY), POWER_POLARITY);

    let mut i2c_config = i2c::Config::default();
    i2c_config.frequency = Hertz(I2C_FREQUENCY_HZ);
    let bus = I2cTransport::new(I2c::new_blocking(I2C1, PB8, PB9, i2c_config));

    let channels = ChannelList::stock();
    defmt::info!(
        "node: {=usize} channels, rail switch on {}",
        channels.len(),
        LINE_LABELS[POWER_LINE_INDEX]
    );
    for channel in &channels {
        defmt::info!(
            "node: channel {} at {=u8}",
            channel.name,
            channel.address.raw()
        );
    }

    let scheduler = DutyCycleScheduler::new(
        channels,
        power,
        bus,
        Delay,
        DutyCycleConfig::default(),
    );

    spawner
        .spawn(sensor_task::run(scheduler, LogSink::new()))
        .expect("failed to spawn sensor task");
}
