//! `bench`: DSP kernel timings per SIMD tier.

use crate::viz::simd;

pub fn cmd_bench(block_size: usize, iterations: u32) -> anyhow::Result<()> {
    anyhow::ensure!(block_size >= 16, "block size must be at least 16");
    anyhow::ensure!(iterations > 0, "iterations must be positive");

    simd::log_capabilities();
    println!("Benchmarking DSP kernels...\n");
    let results = simd::run_benchmark(block_size, iterations);
    println!("{}", results.summary());
    println!(
        "\nSpectrum step speedup ({} over baseline): {:.2}x",
        results
            .tiers
            .last()
            .map(|t| t.level.name())
            .unwrap_or("baseline"),
        results.spectrum_speedup()
    );
    Ok(())
}
