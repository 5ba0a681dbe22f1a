use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationarityTest {
    pub test_statistic: f64,
    pub p_value: f64,
    pub used_lag: usize,
    pub is_stationary: bool,
    pub interpretation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StationarityType {
    Stationary,
    NonStationary,
    TrendStationary,
    DifferenceStationary,
}

impl StationarityType {
    /// ADF rejects a unit root; KPSS fails to reject stationarity.
    ///
    /// | ADF | KPSS | label                 |
    /// |-----|------|-----------------------|
    /// | yes | yes  | stationary            |
    /// | no  | no   | non-stationary        |
    /// | no  | yes  | trend-stationary      |
    /// | yes | no   | difference-stationary |
    pub fn classify(adf_stationary: bool, kpss_stationary: bool) -> Self {
        match (adf_stationary, kpss_stationary) {
            (true, true) => StationarityType::Stationary,
            (false, false) => StationarityType::NonStationary,
            (false, true) => StationarityType::TrendStationary,
            (true, false) => StationarityType::DifferenceStationary,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StationarityType::Stationary => "stationary",
            StationarityType::NonStationary => "non-stationary",
            StationarityType::TrendStationary => "trend-stationary",
            StationarityType::DifferenceStationary => "difference-stationary",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationarityReport {
    pub adf: StationarityTest,
    pub kpss: StationarityTest,
    pub stationarity_type: StationarityType,
    pub tests_agree: bool,
}

impl StationarityReport {
    pub fn from_tests(adf: StationarityTest, kpss: StationarityTest) -> Self {
        let stationarity_type = StationarityType::classify(adf.is_stationary, kpss.is_stationary);
        let tests_agree = adf.is_stationary == kpss.is_stationary;
        Self {
            adf,
            kpss,
            stationarity_type,
            tests_agree,
        }
    }
}
