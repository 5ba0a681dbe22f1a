use ndarray::{s, Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Single LSTM layer. Gate blocks are stacked as `[input | forget | cell | output]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmLayer {
    pub input_size: usize,
    pub hidden_size: usize,
    pub w: Array2<f64>,
    pub u: Array2<f64>,
    pub b: Array1<f64>,
}

#[derive(Debug, Clone)]
pub struct LstmGrads {
    pub w: Array2<f64>,
    pub u: Array2<f64>,
    pub b: Array1<f64>,
}

impl LstmGrads {
    pub fn zeros_like(layer: &LstmLayer) -> Self {
        Self {
            w: Array2::zeros(layer.w.raw_dim()),
            u: Array2::zeros(layer.u.raw_dim()),
            b: Array1::zeros(layer.b.raw_dim()),
        }
    }

    pub fn add_assign(&mut self, other: &LstmGrads) {
        self.w += &other.w;
        self.u += &other.u;
        self.b += &other.b;
    }

    pub fn scale(&mut self, factor: f64) {
        self.w *= factor;
        self.u *= factor;
        self.b *= factor;
    }

    pub fn sum_sq(&self) -> f64 {
        self.w.iter().chain(self.u.iter()).chain(self.b.iter()).map(|g| g * g).sum()
    }

    pub fn fill_zero(&mut self) {
        self.w.fill(0.0);
        self.u.fill(0.0);
        self.b.fill(0.0);
    }
}

/// Activations of one time step, kept for back-propagation.
#[derive(Debug, Clone)]
pub struct StepCache {
    x: Array1<f64>,
    h_prev: Array1<f64>,
    c_prev: Array1<f64>,
    i: Array1<f64>,
    f: Array1<f64>,
    g: Array1<f64>,
    o: Array1<f64>,
    tanh_c: Array1<f64>,
}

impl LstmLayer {
    pub fn new(input_size: usize, hidden_size: usize, rng: &mut StdRng) -> Self {
        let limit = (1.0 / hidden_size as f64).sqrt();
        let mut uniform = |rows: usize, cols: usize| {
            Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-limit..limit))
        };
        let w = uniform(4 * hidden_size, input_size);
        let u = uniform(4 * hidden_size, hidden_size);
        let mut b = Array1::zeros(4 * hidden_size);
        b.slice_mut(s![hidden_size..2 * hidden_size]).fill(1.0);
        Self {
            input_size,
            hidden_size,
            w,
            u,
            b,
        }
    }

    pub fn forward(&self, xs: &[Array1<f64>]) -> (Vec<Array1<f64>>, Vec<StepCache>) {
        let hs = self.hidden_size;
        let mut h: Array1<f64> = Array1::zeros(hs);
        let mut c: Array1<f64> = Array1::zeros(hs);
        let mut outputs = Vec::with_capacity(xs.len());
        let mut caches = Vec::with_capacity(xs.len());
        for x in xs {
            let z = self.w.dot(x) + self.u.dot(&h) + &self.b;
            let i = z.slice(s![0..hs]).mapv(sigmoid);
            let f = z.slice(s![hs..2 * hs]).mapv(sigmoid);
            let g = z.slice(s![2 * hs..3 * hs]).mapv(f64::tanh);
            let o = z.slice(s![3 * hs..4 * hs]).mapv(sigmoid);
            let c_next = &f * &c + &i * &g;
            let tanh_c = c_next.mapv(f64::tanh);
            let h_next = &o * &tanh_c;
            caches.push(StepCache {
                x: x.clone(),
                h_prev: h,
                c_prev: c,
                i,
                f,
                g,
                o,
                tanh_c,
            });
            outputs.push(h_next.clone());
            h = h_next;
            c = c_next;
        }
        (outputs, caches)
    }

    /// Inference-only pass returning the hidden state at every step.
    pub fn run(&self, xs: &[Array1<f64>]) -> Vec<Array1<f64>> {
        self.forward(xs).0
    }

    /// Back-propagation through time. `dhs[t]` is the loss gradient w.r.t. the output at
    /// step `t`; returns parameter gradients and the gradient w.r.t. every input.
    pub fn backward(&self, caches: &[StepCache], dhs: &[Array1<f64>]) -> (LstmGrads, Vec<Array1<f64>>) {
        let hs = self.hidden_size;
        let mut grads = LstmGrads::zeros_like(self);
        let mut dxs = vec![Array1::zeros(self.input_size); caches.len()];
        let mut dh_next: Array1<f64> = Array1::zeros(hs);
        let mut dc_next: Array1<f64> = Array1::zeros(hs);
        let mut dz: Array1<f64> = Array1::zeros(4 * hs);

        for t in (0..caches.len()).rev() {
            let cache = &caches[t];
            let dh = &dhs[t] + &dh_next;
            let d_o = &dh * &cache.tanh_c;
            let dc = &dh * &cache.o * &cache.tanh_c.mapv(|v| 1.0 - v * v) + &dc_next;
            let d_i = &dc * &cache.g;
            let d_g = &dc * &cache.i;
            let d_f = &dc * &cache.c_prev;
            dc_next = &dc * &cache.f;

            dz.slice_mut(s![0..hs])
                .assign(&(&d_i * &cache.i.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![hs..2 * hs])
                .assign(&(&d_f * &cache.f.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![2 * hs..3 * hs])
                .assign(&(&d_g * &cache.g.mapv(|v| 1.0 - v * v)));
            dz.slice_mut(s![3 * hs..4 * hs])
                .assign(&(&d_o * &cache.o.mapv(|v| v * (1.0 - v))));

            let dz_col = dz.view().insert_axis(Axis(1));
            grads.w += &dz_col.dot(&cache.x.view().insert_axis(Axis(0)));
            grads.u += &dz_col.dot(&cache.h_prev.view().insert_axis(Axis(0)));
            grads.b += &dz;

            dxs[t] = self.w.t().dot(&dz);
            dh_next = self.u.t().dot(&dz);
        }
        (grads, dxs)
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
