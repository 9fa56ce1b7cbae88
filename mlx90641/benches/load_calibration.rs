// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
use criterion::{criterion_group, criterion_main, Criterion};

use mlx90641::Calibration;
use mlx90641_test_data::{mlx90641_datasheet_eeprom, mock_mlx90641_at_address};

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Calibration Loading");

    group.bench_with_input("from data", &mlx90641_datasheet_eeprom(), |b, eeprom| {
        b.iter(|| Calibration::from_data(eeprom))
    });

    let address = 0x33;
    let mut mocked = mock_mlx90641_at_address(address);
    group.bench_function("from I2C", |b| {
        b.iter(|| Calibration::from_i2c(&mut mocked, address))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
