//! A periodic ticker that stops the loop after five ticks.
//!
//! Run with: `RUST_LOG=tether_core=debug cargo run -p tether-core --example ticker`

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use tether_core::{EventLoopBuilder, Timer, Trackable};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let event_loop = EventLoopBuilder::new()
        .name("ticker")
        .idle_period(Duration::from_millis(100))
        .build()?;

    let ticks = Rc::new(Cell::new(0u32));
    let ticks_clone = ticks.clone();
    let handle = event_loop.clone();
    let ticker = Timer::new(
        &event_loop,
        move || {
            ticks_clone.set(ticks_clone.get() + 1);
            println!("tick {}", ticks_clone.get());
            if ticks_clone.get() == 5 {
                handle.quit();
            }
        },
        Duration::from_millis(50),
        true,
    )?;

    // Idle reports stop once the reporter goes away.
    let reporter = Trackable::new();
    let _idle = event_loop
        .signal_idle()
        .connect_tracked(&reporter, |_| println!("idle"));
    let _quit = event_loop.signal_quit().connect(|_| println!("bye"));

    event_loop.run()?;
    drop(reporter);

    println!("ticked {} times, running: {}", ticks.get(), ticker.running());
    Ok(())
}
