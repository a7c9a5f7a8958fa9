use bridge_api::Record;

// ═══════════════════════════════════════════════════════════════
//  Sensor
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    RainGauge,
    AirQuality,
    Soil,
}

impl SensorKind {
    pub const ALL: [SensorKind; 3] = [SensorKind::RainGauge, SensorKind::AirQuality, SensorKind::Soil];

    /// Префикс UUID в показаниях.
    pub fn label(self) -> &'static str {
        match self {
            SensorKind::RainGauge => "PLUVIOMETRO",
            SensorKind::AirQuality => "QUALIDADE_AR",
            SensorKind::Soil => "SOLO",
        }
    }
}

pub struct Sensor {
    pub id: usize,
    pub kind: SensorKind,
}

impl Sensor {
    pub fn uuid(&self) -> String {
        format!("{}-{}", self.kind.label(), self.id)
    }

    /// Одно показание: UUID, unixtime (секунды) и поля своего типа.
    pub fn reading(&self, rng: &mut Rng, unixtime: i64) -> Record {
        let record = Record::new().with("UUID", self.uuid()).with("unixtime", unixtime);
        match self.kind {
            SensorKind::RainGauge => record
                .with("plu", rng.range_i64(0, 5))
                .with("umi", rng.range_i64(60, 98))
                .with("tem", round2(rng.uniform(18.0, 35.0))),
            SensorKind::AirQuality => record
                .with("co2", rng.range_i64(300, 1000))
                .with("voc", rng.range_i64(0, 500))
                .with("pm25", round2(rng.uniform(0.0, 50.0))),
            SensorKind::Soil => record
                .with("hum", rng.range_i64(10, 90))
                .with("ph", round2(rng.uniform(5.5, 7.5)))
                .with("tmp", round2(rng.uniform(15.0, 35.0))),
        }
    }
}

/// Датчики создаются один раз, тип каждого: случайный.
pub fn new_sensors(count: usize, rng: &mut Rng) -> Vec<Sensor> {
    (0..count)
        .map(|id| Sensor {
            id,
            kind: SensorKind::ALL[rng.next_intn(SensorKind::ALL.len())],
        })
        .collect()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

// ═══════════════════════════════════════════════════════════════
//  RNG (xorshift64)
// ═══════════════════════════════════════════════════════════════

pub struct Rng {
    state: u64,
}

impl Rng {
    pub fn new(seed: i64) -> Self {
        let state = if seed == 0 {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos() as u64
                | 1 // ensure non-zero
        } else {
            seed as u64
        };
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    /// Returns f64 in [0, 1)
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / ((1u64 << 53) as f64)
    }

    pub fn next_intn(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }

    /// Целое из `lo..=hi`.
    pub fn range_i64(&mut self, lo: i64, hi: i64) -> i64 {
        lo + (self.next_u64() % (hi - lo + 1) as u64) as i64
    }

    pub fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        lo + self.next_f64() * (hi - lo)
    }
}
