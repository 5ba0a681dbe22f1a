//! Shape diagnostics for predicted price paths. A path that is perfectly monotone or far
//! smoother than recent history is a sign the model collapsed to its trend.

use crate::model::prediction::PathRealism;
use crate::stats::variance;

const EPS: f64 = 1e-8;

pub fn path_realism(path: &[f64], history: &[f64]) -> PathRealism {
    let window = history.len().min(60).max(20);
    PathRealism {
        monotonic_flag: monotonic_flag(path),
        monotonic_run_max: monotonic_run_max(path),
        diff_vol_ratio: diff_vol_ratio(path, history, window),
        sign_flip_rate: sign_flip_rate(path),
    }
}

fn diffs(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] - w[0]).collect()
}

fn sign(d: f64) -> i8 {
    if d > EPS {
        1
    } else if d < -EPS {
        -1
    } else {
        0
    }
}

/// Paths of up to two points count as monotone.
pub fn monotonic_flag(values: &[f64]) -> bool {
    if values.len() <= 2 {
        return true;
    }
    let d = diffs(values);
    d.iter().all(|x| *x >= -EPS) || d.iter().all(|x| *x <= EPS)
}

/// Longest run of consecutive steps in the same direction; flat steps reset the run.
pub fn monotonic_run_max(values: &[f64]) -> usize {
    if values.len() <= 2 {
        return 0;
    }
    let mut max_run = 0;
    let mut run = 0;
    let mut current = 0i8;
    for d in diffs(values) {
        let s = sign(d);
        if s == 0 {
            run = 0;
            current = 0;
            continue;
        }
        if s == current {
            run += 1;
        } else {
            current = s;
            run = 1;
        }
        max_run = max_run.max(run);
    }
    max_run
}

/// Std of the path's steps over the std of the last `window` historical steps.
pub fn diff_vol_ratio(path: &[f64], history: &[f64], window: usize) -> f64 {
    if path.len() <= 2 || history.len() <= 2 {
        return 0.0;
    }
    let window = window.max(3);
    let tail = if history.len() > window {
        &history[history.len() - window..]
    } else {
        history
    };
    let hist_std = variance(&diffs(tail)).sqrt();
    let path_std = variance(&diffs(path)).sqrt();
    let ratio = path_std / hist_std.max(EPS);
    if ratio.is_finite() {
        ratio
    } else {
        0.0
    }
}

/// Share of direction changes among consecutive non-flat steps.
pub fn sign_flip_rate(values: &[f64]) -> f64 {
    if values.len() <= 3 {
        return 0.0;
    }
    let signs: Vec<i8> = diffs(values)
        .into_iter()
        .map(sign)
        .filter(|s| *s != 0)
        .collect();
    if signs.len() <= 1 {
        return 0.0;
    }
    let flips = signs.windows(2).filter(|w| w[0] != w[1]).count();
    flips as f64 / (signs.len() - 1) as f64
}
