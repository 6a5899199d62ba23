// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Runs the aquarium frame loop without a window and prints what each frame did.

```text
cargo run --example headless_tank -- [fish] [frames] [--async] [--per-instance] [--soft] [--come-and-go]
```
*/

use aquarium::images::{AquariumOptions, Behavior, Engine};
use aquarium::imp::{Device, SoftDevice};
use std::sync::Arc;

fn run<D: Device>(device: Arc<D>, options: AquariumOptions, frames: usize) {
    let mut engine = match Engine::new(device, options) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("can't create engine: {e}");
            return;
        }
    };
    for _ in 0..frames {
        match engine.render_frame(1.0 / 60.0) {
            Ok(report) => println!(
                "frame {:>4}: {:>6} fish, {:>6} draws, {:?}{}",
                report.frame,
                report.fish_count,
                report.draws,
                report.reallocation,
                if report.upload_dropped { ", upload dropped" } else { "" }
            ),
            Err(e) => {
                eprintln!("frame failed: {e}");
                break;
            }
        }
    }
    println!("{:?}", engine.pool_stats());
    engine.dispose();
}

fn main() {
    let mut positional = Vec::new();
    let mut options = AquariumOptions::default();
    let mut soft = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--async" => options.buffer_mapping_async = true,
            "--per-instance" => options.dynamic_buffer_offset = false,
            "--soft" => soft = true,
            "--come-and-go" => {
                options.simulate_fish_come_and_go = true;
                options.behaviors = vec![
                    Behavior::add(10, 500),
                    Behavior::remove(10, 800),
                    Behavior::add(10, 2000),
                ];
            }
            other => positional.push(other.parse::<usize>().unwrap_or_else(|_| panic!("unexpected argument {other}"))),
        }
    }
    if let Some(fish) = positional.first() {
        options.fish_count = *fish;
    }
    let frames = positional.get(1).copied().unwrap_or(60);

    if !soft {
        match test_executors::sleep_on(aquarium::imp::WgpuDevice::new()) {
            Ok(device) => return run(Arc::new(device), options, frames),
            Err(e) => eprintln!("wgpu unavailable ({e}); using the soft device"),
        }
    }
    run(Arc::new(SoftDevice::new()), options, frames);
}
