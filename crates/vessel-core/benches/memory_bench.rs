//! Benchmark: host fill / copy / cast throughput through the memory operations.

use std::time::Instant;

use vessel_core::{DType, Tensor};

fn time<F: FnMut()>(iters: usize, mut f: F) -> f64 {
    let start = Instant::now();
    for _ in 0..iters {
        f();
    }
    start.elapsed().as_secs_f64() / iters as f64
}

fn gbps(bytes: usize, secs: f64) -> f64 {
    bytes as f64 / secs / 1e9
}

fn main() {
    println!("=== Vessel Memory Benchmark ===\n");
    println!(
        "{:<12} {:>12} {:>12} {:>12} {:>12}",
        "Elements", "Zero (GB/s)", "Clone (GB/s)", "Cast (ms)", "Slice (ms)"
    );
    println!("{}", "-".repeat(64));

    for &n in &[1usize << 10, 1 << 14, 1 << 18, 1 << 22] {
        let data: Vec<f32> = (0..n).map(|i| ((i * 7 + 3) % 13) as f32 * 0.1 - 0.6).collect();
        let mut t = Tensor::from_slice(&data, [n]).unwrap();
        let nbytes = t.nbytes();
        let iters = if n <= 1 << 14 {
            1000
        } else if n <= 1 << 18 {
            100
        } else {
            10
        };

        let zero_s = time(iters, || t.zero().unwrap());
        let clone_s = time(iters, || {
            let _ = t.clone();
        });
        let cast_s = time(iters, || {
            let _ = t.cast(DType::F64).unwrap();
        });

        let side = (n as f64).sqrt() as usize;
        let mut square = t.clone();
        square.reshape(&[side as isize, -1]).unwrap();
        let half = side / 2;
        let slice_s = time(iters, || {
            let _ = square.slice(&[half / 2, half / 2], &[half, half]).unwrap();
        });

        println!(
            "{:<12} {:>12.2} {:>12.2} {:>12.3} {:>12.3}",
            n,
            gbps(nbytes, zero_s),
            gbps(nbytes, clone_s),
            cast_s * 1000.0,
            slice_s * 1000.0,
        );
    }
}
