use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};

use pv_adjuster::data::model::{MISSING_MARKER, NUMERIC_COLUMNS, TIMESTAMP_COLUMN};

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }
}

/// Clear-sky bell between 06:00 and 20:00, peaking at 13:00.
fn daylight(hour: f64) -> f64 {
    if !(6.0..=20.0).contains(&hour) {
        return 0.0;
    }
    let phase = (hour - 6.0) / 14.0 * std::f64::consts::PI;
    phase.sin().max(0.0)
}

fn main() -> Result<()> {
    let mut rng = SimpleRng::new(42);
    let output_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "solar_forecasts.csv".to_string());

    // Three days of half-hourly periods.
    let start = NaiveDate::from_ymd_opt(2024, 6, 1)
        .and_then(|d| d.and_hms_opt(0, 30, 0))
        .context("invalid start date")?;
    let periods = 3 * 48;

    let mut writer = csv::Writer::from_path(&output_path)
        .with_context(|| format!("creating {output_path}"))?;

    let mut header = vec![TIMESTAMP_COLUMN];
    header.extend(NUMERIC_COLUMNS);
    writer.write_record(&header)?;

    for i in 0..periods {
        let at = start + Duration::minutes(30 * i);
        let hour = f64::from(i as u32 % 48) / 2.0 + 0.5;
        let sun = daylight(hour);
        let cloud = rng.uniform(0.0, 100.0);
        let clear = 1.0 - 0.75 * cloud / 100.0;

        let ghi = 950.0 * sun * clear;
        let dni = 800.0 * sun * clear * clear;
        let dhi = (ghi - dni * sun).max(0.0);
        let pv = 4.2 * sun * clear;

        let values = [
            pv,
            ghi,
            dni,
            dhi,
            14.0 + 9.0 * sun + rng.uniform(-1.0, 1.0),
            rng.uniform(40.0, 90.0),
            rng.uniform(0.5, 9.0),
            rng.uniform(0.0, 359.0),
            cloud,
        ];

        let mut record = vec![at.format("%Y-%m-%dT%H:%M:%SZ").to_string()];
        for (col, value) in values.iter().enumerate() {
            // A few gaps, the way the upstream feed reports them.
            if (i % 37 == 11 && col == 0) || (i % 53 == 20 && col == 4) {
                record.push(MISSING_MARKER.to_string());
            } else {
                record.push(format!("{value:.4}"));
            }
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;

    println!(
        "Wrote {periods} forecast periods ({} columns) to {output_path}",
        NUMERIC_COLUMNS.len() + 1
    );
    Ok(())
}
