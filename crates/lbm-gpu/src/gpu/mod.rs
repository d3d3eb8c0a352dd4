//! GPU kernels.
//!
//! The eight kernels are CUDA C with the lattice constants baked in as
//! `__constant__` tables, generated from a [`Lattice`] and compiled at
//! runtime with NVRTC. The device backend lives behind the `cuda` feature;
//! source generation is always available so it can be inspected and tested
//! without a GPU.

#[cfg(feature = "cuda")]
mod cuda;

#[cfg(feature = "cuda")]
pub use cuda::{CudaBackend, CudaLatticeState};

use std::fmt::Write;

use crate::kernels::KernelStage;
use crate::lattice::{Lattice, Q};

/// Entry point of the `fin = equilibrium(rho, u)` kernel (also used for `feq`).
pub const EQUILIBRIUM_KERNEL: &str = "lbm_equilibrium";
/// Entry point of the moments kernel.
pub const MACROSCOPIC_KERNEL: &str = "lbm_macroscopic";
/// Entry point of the outflow kernel.
pub const OUTFLOW_KERNEL: &str = "lbm_outflow";
/// Entry point of the inflow kernel.
pub const INFLOW_KERNEL: &str = "lbm_inflow";
/// Entry point of the inflow reconstruction kernel.
pub const UPDATE_FIN_KERNEL: &str = "lbm_update_fin";
/// Entry point of the BGK collision kernel.
pub const COLLISION_KERNEL: &str = "lbm_collision";
/// Entry point of the bounce-back kernel.
pub const BOUNCE_BACK_KERNEL: &str = "lbm_bounce_back";
/// Entry point of the streaming kernel.
pub const STREAMING_KERNEL: &str = "lbm_streaming";

/// CUDA entry point implementing `stage`.
pub const fn kernel_name(stage: KernelStage) -> &'static str {
    match stage {
        KernelStage::Outflow => OUTFLOW_KERNEL,
        KernelStage::Macroscopic => MACROSCOPIC_KERNEL,
        KernelStage::Inflow => INFLOW_KERNEL,
        KernelStage::Equilibrium => EQUILIBRIUM_KERNEL,
        KernelStage::UpdateFin => UPDATE_FIN_KERNEL,
        KernelStage::Collision => COLLISION_KERNEL,
        KernelStage::BounceBack => BOUNCE_BACK_KERNEL,
        KernelStage::Streaming => STREAMING_KERNEL,
    }
}

/// Kernel bodies. Indexing follows the host layout: `(k * nx + row) * ny + col`.
const KERNEL_BODIES: &str = r#"
#define IDX(k, row, col) (((long long)(k) * nx + (row)) * ny + (col))

extern "C" __global__ void lbm_equilibrium(
    const double* rho,
    const double* u,
    double* feq,
    int nx,
    int ny
) {
    int row = blockIdx.x * blockDim.x + threadIdx.x;
    int col = blockIdx.y * blockDim.y + threadIdx.y;
    if (row >= nx || col >= ny) return;

    long long site = (long long)row * ny + col;
    long long plane = (long long)nx * ny;
    double ux = u[site];
    double uy = u[plane + site];
    double r = rho[site];
    double usqr = 1.5 * (ux * ux + uy * uy);

    for (int k = 0; k < LBM_Q; k++) {
        double cu = 3.0 * (LBM_VX[k] * ux + LBM_VY[k] * uy);
        feq[IDX(k, row, col)] = r * LBM_W[k] * (1.0 + cu + 0.5 * cu * cu - usqr);
    }
}

extern "C" __global__ void lbm_macroscopic(
    const double* fin,
    double* rho,
    double* u,
    int nx,
    int ny
) {
    int row = blockIdx.x * blockDim.x + threadIdx.x;
    int col = blockIdx.y * blockDim.y + threadIdx.y;
    if (row >= nx || col >= ny) return;

    double r = 0.0;
    double mx = 0.0;
    double my = 0.0;
    for (int k = 0; k < LBM_Q; k++) {
        double f = fin[IDX(k, row, col)];
        r += f;
        mx += LBM_VX[k] * f;
        my += LBM_VY[k] * f;
    }

    long long site = (long long)row * ny + col;
    long long plane = (long long)nx * ny;
    rho[site] = r;
    u[site] = mx / r;
    u[plane + site] = my / r;
}

extern "C" __global__ void lbm_outflow(double* fin, int nx, int ny) {
    int col = blockIdx.x * blockDim.x + threadIdx.x;
    if (col >= ny) return;

    for (int i = 0; i < 3; i++) {
        int k = LBM_LEFTWARD[i];
        fin[IDX(k, nx - 1, col)] = fin[IDX(k, nx - 2, col)];
    }
}

extern "C" __global__ void lbm_inflow(
    const double* fin,
    const double* vel,
    double* rho,
    double* u,
    int nx,
    int ny
) {
    int col = blockIdx.x * blockDim.x + threadIdx.x;
    if (col >= ny) return;

    long long plane = (long long)nx * ny;
    double ux = vel[col];
    u[col] = ux;
    u[plane + col] = vel[ny + col];

    double vertical = fin[IDX(LBM_VERTICAL[0], 0, col)]
        + fin[IDX(LBM_VERTICAL[1], 0, col)]
        + fin[IDX(LBM_VERTICAL[2], 0, col)];
    double leftward = fin[IDX(LBM_LEFTWARD[0], 0, col)]
        + fin[IDX(LBM_LEFTWARD[1], 0, col)]
        + fin[IDX(LBM_LEFTWARD[2], 0, col)];
    rho[col] = (vertical + 2.0 * leftward) / (1.0 - ux);
}

extern "C" __global__ void lbm_update_fin(double* fin, const double* feq, int nx, int ny) {
    int col = blockIdx.x * blockDim.x + threadIdx.x;
    if (col >= ny) return;

    for (int i = 0; i < 3; i++) {
        int k = LBM_RIGHTWARD[i];
        int o = LBM_Q - 1 - k;
        fin[IDX(k, 0, col)] = feq[IDX(k, 0, col)] + fin[IDX(o, 0, col)] - feq[IDX(o, 0, col)];
    }
}

extern "C" __global__ void lbm_collision(
    const double* omega,
    const double* fin,
    const double* feq,
    double* fout,
    int nx,
    int ny
) {
    int row = blockIdx.x * blockDim.x + threadIdx.x;
    int col = blockIdx.y * blockDim.y + threadIdx.y;
    if (row >= nx || col >= ny) return;

    double w = omega[(long long)row * ny + col];
    for (int k = 0; k < LBM_Q; k++) {
        long long i = IDX(k, row, col);
        fout[i] = (1.0 - w) * fin[i] + w * feq[i];
    }
}

extern "C" __global__ void lbm_bounce_back(
    double* fout,
    const double* fin,
    const unsigned char* obstacle,
    int nx,
    int ny
) {
    int row = blockIdx.x * blockDim.x + threadIdx.x;
    int col = blockIdx.y * blockDim.y + threadIdx.y;
    if (row >= nx || col >= ny) return;
    if (!obstacle[(long long)row * ny + col]) return;

    for (int k = 0; k < LBM_Q; k++) {
        fout[IDX(k, row, col)] = fin[IDX(LBM_Q - 1 - k, row, col)];
    }
}

extern "C" __global__ void lbm_streaming(double* fin, const double* fout, int nx, int ny) {
    int row = blockIdx.x * blockDim.x + threadIdx.x;
    int col = blockIdx.y * blockDim.y + threadIdx.y;
    if (row >= nx || col >= ny) return;

    for (int k = 0; k < LBM_Q; k++) {
        int dst_row = (row + LBM_VX[k] + nx) % nx;
        int dst_col = (col + LBM_VY[k] + ny) % ny;
        fin[IDX(k, dst_row, dst_col)] = fout[IDX(k, row, col)];
    }
}
"#;

fn int_table(values: impl IntoIterator<Item = i64>) -> String {
    values
        .into_iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Full CUDA source for `lattice`.
///
/// Weights are printed with round-trip precision so the device sees the
/// exact same `f64` values as the host.
pub fn kernel_source(lattice: &Lattice) -> String {
    let velocities = lattice.velocities();
    let mut src = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(src, "#define LBM_Q {Q}");
    let _ = writeln!(
        src,
        "__constant__ int LBM_VX[{Q}] = {{ {} }};",
        int_table(velocities.iter().map(|v| v[0] as i64))
    );
    let _ = writeln!(
        src,
        "__constant__ int LBM_VY[{Q}] = {{ {} }};",
        int_table(velocities.iter().map(|v| v[1] as i64))
    );
    let weights = lattice
        .weights()
        .iter()
        .map(|w| format!("{w:?}"))
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(src, "__constant__ double LBM_W[{Q}] = {{ {weights} }};");

    for (name, triple) in [
        ("LBM_RIGHTWARD", crate::lattice::RIGHTWARD),
        ("LBM_VERTICAL", crate::lattice::VERTICAL),
        ("LBM_LEFTWARD", crate::lattice::LEFTWARD),
    ] {
        let _ = writeln!(
            src,
            "__constant__ int {name}[3] = {{ {} }};",
            int_table(triple.iter().map(|&k| k as i64))
        );
    }

    src.push_str(KERNEL_BODIES);
    src
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_defines_every_kernel() {
        let src = kernel_source(&Lattice::d2q9());
        for stage in KernelStage::PIPELINE {
            let signature = format!("__global__ void {}(", kernel_name(stage));
            assert!(src.contains(&signature), "missing {}", kernel_name(stage));
        }
    }

    #[test]
    fn test_source_bakes_lattice_constants() {
        let src = kernel_source(&Lattice::d2q9());
        assert!(src.contains("#define LBM_Q 9"));
        assert!(src.contains("LBM_VX[9] = { 1, 1, 1, 0, 0, 0, -1, -1, -1 }"));
        assert!(src.contains("LBM_VY[9] = { 1, 0, -1, 1, 0, -1, 1, 0, -1 }"));
        assert!(src.contains("LBM_LEFTWARD[3] = { 6, 7, 8 }"));
        assert!(src.contains(&format!("{:?}", 4.0f64 / 9.0)));
    }

    #[test]
    fn test_weight_literals_round_trip() {
        for w in Lattice::d2q9().weights() {
            let literal = format!("{w:?}");
            assert_eq!(literal.parse::<f64>().unwrap(), *w);
        }
    }
}
