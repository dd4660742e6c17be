// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use std::path::PathBuf;
use tally_app::{LineItem, Record};
use time::Date;
use time::macros::date;

const NAME_PREFIXES: [&str; 14] = [
    "Acme", "Birch", "Cedar", "Delta", "Ember", "Fjord", "Granite", "Harbor", "Iris", "Juniper",
    "Kestrel", "Lumen", "Meridian", "Nimbus",
];

const NAME_NOUNS: [&str; 12] = [
    "Analytics",
    "Bakery",
    "Freight",
    "Robotics",
    "Studios",
    "Logistics",
    "Dental",
    "Outfitters",
    "Labs",
    "Brewing",
    "Legal",
    "Clinics",
];

const NAME_SUFFIXES: [&str; 5] = ["Inc", "LLC", "Co", "Group", "Partners"];

const PLANS: [(&str, i64); 4] = [
    ("starter", 2_900),
    ("team", 9_900),
    ("business", 29_900),
    ("enterprise", 120_000),
];

const ADDONS: [(&str, i64); 6] = [
    ("extra seats", 1_500),
    ("priority support", 4_900),
    ("audit log", 2_000),
    ("sso", 7_500),
    ("sandbox", 1_000),
    ("data export", 2_500),
];

const REGIONS: [&str; 5] = ["us-east", "us-west", "eu-central", "ap-south", "sa-east"];

const FIRST_NAMES: [&str; 12] = [
    "avery", "jordan", "taylor", "riley", "morgan", "casey", "quinn", "parker", "drew", "rowan",
    "hayden", "elliot",
];

const EARLIEST_SIGNUP: Date = date!(2019 - 01 - 01);
const LATEST_SIGNUP: Date = date!(2025 - 12 - 31);

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }

    fn one_in(&mut self, n: usize) -> bool {
        self.int_n(n) == 0
    }
}

/// Seeded generator of plausible billing accounts. The same seed always
/// yields the same sequence.
#[derive(Debug, Clone)]
pub struct AccountFaker {
    rng: DeterministicRng,
    serial: u32,
}

impl AccountFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            serial: 0,
        }
    }

    pub fn int_n(&mut self, n: usize) -> usize {
        self.rng.int_n(n)
    }

    pub fn record(&mut self) -> Record {
        self.serial += 1;
        let name = self.company_name();
        let id = format!("cus_{:04x}{:04}", self.rng.next_u64() & 0xffff, self.serial);

        let mut record = Record::new(id, name.clone());
        record.email = self.email(&name);
        record.aliases = vec![format!("ACCT-{:05}", 10_000 + self.serial)];
        if self.rng.one_in(4) {
            record
                .aliases
                .push(format!("legacy-{}", self.int_range_i64(100, 999)));
        }

        let (plan, base) = PLANS[self.rng.int_n(PLANS.len())];
        record.plan = plan.to_owned();
        record.line_items = self.line_items(plan, base);
        record.created_on = Some(self.signup_date());
        record
            .fields
            .insert("region".to_owned(), self.pick(&REGIONS).to_owned());
        record.fields.insert(
            "seats".to_owned(),
            self.int_range_i64(1, 250).to_string(),
        );
        record
    }

    pub fn records(&mut self, count: usize) -> Vec<Record> {
        (0..count).map(|_| self.record()).collect()
    }

    /// Roughly one account in six has churned (no charges) and one in ten
    /// carries a credit large enough to push it negative.
    fn line_items(&mut self, plan: &str, base: i64) -> Vec<LineItem> {
        if self.rng.one_in(6) {
            return Vec::new();
        }
        let mut items = vec![LineItem {
            description: format!("{plan} plan"),
            amount_cents: base,
        }];
        for _ in 0..self.rng.int_n(3) {
            let (description, cents) = ADDONS[self.rng.int_n(ADDONS.len())];
            items.push(LineItem {
                description: description.to_owned(),
                amount_cents: cents,
            });
        }
        if self.rng.one_in(10) {
            items.push(LineItem {
                description: "service credit".to_owned(),
                amount_cents: -(base + self.int_range_i64(100, 5_000)),
            });
        }
        items
    }

    fn company_name(&mut self) -> String {
        let prefix = self.pick(&NAME_PREFIXES);
        let noun = self.pick(&NAME_NOUNS);
        if self.rng.one_in(3) {
            format!("{prefix} {noun} {}", self.pick(&NAME_SUFFIXES))
        } else {
            format!("{prefix} {noun}")
        }
    }

    fn email(&mut self, company: &str) -> String {
        let domain = company
            .split_whitespace()
            .take(2)
            .collect::<String>()
            .to_ascii_lowercase();
        format!("{}@{domain}.example", self.pick(&FIRST_NAMES))
    }

    fn signup_date(&mut self) -> Date {
        let start = EARLIEST_SIGNUP.to_julian_day();
        let end = LATEST_SIGNUP.to_julian_day();
        let offset = self.int_range_i64(0, i64::from(end - start));
        let day = start.saturating_add(i32::try_from(offset).unwrap_or(0));
        Date::from_julian_day(day).unwrap_or(EARLIEST_SIGNUP)
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }

    fn int_range_i64(&mut self, min: i64, max: i64) -> i64 {
        if max <= min {
            return min;
        }
        let span = max - min + 1;
        min + (self.rng.next_u64() % (span as u64)) as i64
    }
}

/// Demo data set used by `--demo`.
pub fn demo_records(seed: u64, count: usize) -> Vec<Record> {
    AccountFaker::new(seed).records(count)
}

/// Small hand-written list with known values, ordered as a source would
/// return it.
pub fn fixture_records() -> Vec<Record> {
    let make = |id: &str, name: &str, email: &str, cents: &[i64]| {
        let mut record = Record::new(id, name);
        record.email = email.to_owned();
        record.line_items = cents
            .iter()
            .map(|amount| LineItem {
                description: "plan".to_owned(),
                amount_cents: *amount,
            })
            .collect();
        record
    };
    vec![
        make("cus_acme", "Acme Rockets", "ops@acme.example", &[9_900, 1_500]),
        make("cus_birch", "Birch Bakery", "hello@birch.example", &[]),
        make("cus_cedar", "Cedar Analytics", "it@cedar.example", &[29_900]),
        make("cus_delta", "Delta Freight", "ap@delta.example", &[2_900, -4_000]),
        make("cus_ember", "Ember Studios", "team@ember.example", &[2_900]),
    ]
}

/// Writes `records` as a JSON array into a fresh temp dir. Keep the
/// returned `TempDir` alive for as long as the path is used.
pub fn temp_records_file(records: &[Record]) -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let path = dir.path().join("records.json");
    let body = serde_json::to_string_pretty(records).context("encode records")?;
    std::fs::write(&path, body).with_context(|| format!("write {}", path.display()))?;
    Ok((dir, path))
}
