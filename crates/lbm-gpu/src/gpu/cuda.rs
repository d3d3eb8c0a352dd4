//! CUDA backend.

use std::sync::Arc;

use cudarc::driver::{CudaContext, CudaFunction, CudaModule, CudaSlice, CudaStream, PushKernelArg};
use cudarc::nvrtc::compile_ptx;

use crate::error::{LbmError, Result};
use crate::field::{ScalarField, VectorField};
use crate::kernels::LatticeBackend;
use crate::lattice::Lattice;
use crate::launch_config::{LaunchConfigurator, LaunchPlan};
use crate::params::FlowParams;
use crate::state::LatticeState;

use super::{
    kernel_source, BOUNCE_BACK_KERNEL, COLLISION_KERNEL, EQUILIBRIUM_KERNEL, INFLOW_KERNEL,
    MACROSCOPIC_KERNEL, OUTFLOW_KERNEL, STREAMING_KERNEL, UPDATE_FIN_KERNEL,
};

fn driver_err(e: impl std::fmt::Display) -> LbmError {
    LbmError::backend(e.to_string())
}

/// Device-resident fields.
pub struct CudaLatticeState {
    nx: usize,
    ny: usize,
    fin: CudaSlice<f64>,
    feq: CudaSlice<f64>,
    fout: CudaSlice<f64>,
    rho: CudaSlice<f64>,
    u: CudaSlice<f64>,
    omega: CudaSlice<f64>,
    inflow: CudaSlice<f64>,
    obstacle: CudaSlice<u8>,
}

impl CudaLatticeState {
    /// Lattice extents.
    pub fn extents(&self) -> (usize, usize) {
        (self.nx, self.ny)
    }
}

struct LbmKernels {
    equilibrium: CudaFunction,
    macroscopic: CudaFunction,
    outflow: CudaFunction,
    inflow: CudaFunction,
    update_fin: CudaFunction,
    collision: CudaFunction,
    bounce_back: CudaFunction,
    streaming: CudaFunction,
}

impl LbmKernels {
    fn load(module: &Arc<CudaModule>) -> Result<Self> {
        let load = |name: &str| module.load_function(name).map_err(driver_err);
        Ok(Self {
            equilibrium: load(EQUILIBRIUM_KERNEL)?,
            macroscopic: load(MACROSCOPIC_KERNEL)?,
            outflow: load(OUTFLOW_KERNEL)?,
            inflow: load(INFLOW_KERNEL)?,
            update_fin: load(UPDATE_FIN_KERNEL)?,
            collision: load(COLLISION_KERNEL)?,
            bounce_back: load(BOUNCE_BACK_KERNEL)?,
            streaming: load(STREAMING_KERNEL)?,
        })
    }
}

/// Kernel pipeline on an NVIDIA GPU.
///
/// All fields stay on the device between steps; launches are queued on a
/// single stream, which orders them. Host reads synchronize first.
pub struct CudaBackend {
    context: Arc<CudaContext>,
    stream: Arc<CudaStream>,
    kernels: LbmKernels,
    plan: LaunchPlan,
    nx: i32,
    ny: i32,
}

impl CudaBackend {
    /// Compile the kernels for `lattice` on device `ordinal`.
    pub fn new(ordinal: usize, lattice: &Lattice, plan: LaunchPlan) -> Result<Self> {
        lattice.validate()?;
        let nx = i32::try_from(plan.nx)
            .map_err(|_| LbmError::config(format!("nx = {} too large for the device", plan.nx)))?;
        let ny = i32::try_from(plan.ny)
            .map_err(|_| LbmError::config(format!("ny = {} too large for the device", plan.ny)))?;

        let context = CudaContext::new(ordinal).map_err(driver_err)?;
        let stream = context.default_stream();

        let ptx = compile_ptx(kernel_source(lattice))
            .map_err(|e| LbmError::backend(format!("NVRTC compilation failed: {e}")))?;
        let module = context.load_module(ptx).map_err(driver_err)?;
        let kernels = LbmKernels::load(&module)?;

        tracing::info!(
            ordinal,
            nx,
            ny,
            sites_block = ?plan.sites.block_dim,
            columns_block = ?plan.columns.block_dim,
            "created CUDA backend"
        );

        Ok(Self {
            context,
            stream,
            kernels,
            plan,
            nx,
            ny,
        })
    }

    /// Backend on device `ordinal` sized for `params`.
    pub fn for_params(ordinal: usize, params: &FlowParams) -> Result<Self> {
        let plan = LaunchConfigurator::new(params.dispatch).plan(params.nx, params.ny)?;
        Self::new(ordinal, &Lattice::d2q9(), plan)
    }

    /// The launch plan used for every kernel.
    pub fn plan(&self) -> &LaunchPlan {
        &self.plan
    }

    /// The device context.
    pub fn context(&self) -> &Arc<CudaContext> {
        &self.context
    }

    fn to_device<T: cudarc::driver::DeviceRepr>(&self, data: &[T]) -> Result<CudaSlice<T>> {
        self.stream.memcpy_stod(data).map_err(driver_err)
    }

    fn to_host(&self, src: &CudaSlice<f64>, dst: &mut [f64]) -> Result<()> {
        self.stream.memcpy_dtoh(src, dst).map_err(driver_err)
    }

    fn launch_equilibrium(
        &self,
        rho: &CudaSlice<f64>,
        u: &CudaSlice<f64>,
        out: &mut CudaSlice<f64>,
    ) -> Result<()> {
        // SAFETY: argument order and types match `lbm_equilibrium`; every
        // buffer was allocated for the extents the plan was computed for.
        unsafe {
            self.stream
                .launch_builder(&self.kernels.equilibrium)
                .arg(rho)
                .arg(u)
                .arg(out)
                .arg(&self.nx)
                .arg(&self.ny)
                .launch(self.plan.sites.into())
                .map_err(driver_err)?;
        }
        Ok(())
    }
}

impl LatticeBackend for CudaBackend {
    type State = CudaLatticeState;

    fn name(&self) -> &'static str {
        "cuda"
    }

    fn upload(&self, host: &LatticeState) -> Result<CudaLatticeState> {
        host.check_shapes()?;
        self.plan.check_extents(host.nx(), host.ny())?;

        Ok(CudaLatticeState {
            nx: host.nx(),
            ny: host.ny(),
            fin: self.to_device(host.fin.as_slice())?,
            feq: self.to_device(host.feq.as_slice())?,
            fout: self.to_device(host.fout.as_slice())?,
            rho: self.to_device(host.rho.as_slice())?,
            u: self.to_device(host.u.as_slice())?,
            omega: self.to_device(host.omega.as_slice())?,
            inflow: self.to_device(host.inflow.as_slice())?,
            obstacle: self.to_device(&host.obstacle.to_bytes())?,
        })
    }

    fn download(&self, state: &CudaLatticeState, host: &mut LatticeState) -> Result<()> {
        if state.extents() != (host.nx(), host.ny()) {
            return Err(LbmError::shape_mismatch(
                "device state",
                &[host.nx(), host.ny()],
                &[state.nx, state.ny],
            ));
        }
        self.synchronize()?;
        self.to_host(&state.fin, host.fin.as_mut_slice())?;
        self.to_host(&state.feq, host.feq.as_mut_slice())?;
        self.to_host(&state.fout, host.fout.as_mut_slice())?;
        self.to_host(&state.rho, host.rho.as_mut_slice())?;
        self.to_host(&state.u, host.u.as_mut_slice())?;
        self.synchronize()
    }

    fn initialize(&self, s: &mut CudaLatticeState) -> Result<()> {
        self.launch_equilibrium(&s.rho, &s.u, &mut s.fin)
    }

    fn outflow(&self, s: &mut CudaLatticeState) -> Result<()> {
        // SAFETY: matches `lbm_outflow(double*, int, int)`.
        unsafe {
            self.stream
                .launch_builder(&self.kernels.outflow)
                .arg(&mut s.fin)
                .arg(&self.nx)
                .arg(&self.ny)
                .launch(self.plan.columns.into())
                .map_err(driver_err)?;
        }
        Ok(())
    }

    fn macroscopic(&self, s: &mut CudaLatticeState) -> Result<()> {
        // SAFETY: matches `lbm_macroscopic(const double*, double*, double*, int, int)`.
        unsafe {
            self.stream
                .launch_builder(&self.kernels.macroscopic)
                .arg(&s.fin)
                .arg(&mut s.rho)
                .arg(&mut s.u)
                .arg(&self.nx)
                .arg(&self.ny)
                .launch(self.plan.sites.into())
                .map_err(driver_err)?;
        }
        Ok(())
    }

    fn inflow(&self, s: &mut CudaLatticeState) -> Result<()> {
        // SAFETY: matches `lbm_inflow(const double*, const double*, double*, double*, int, int)`.
        unsafe {
            self.stream
                .launch_builder(&self.kernels.inflow)
                .arg(&s.fin)
                .arg(&s.inflow)
                .arg(&mut s.rho)
                .arg(&mut s.u)
                .arg(&self.nx)
                .arg(&self.ny)
                .launch(self.plan.columns.into())
                .map_err(driver_err)?;
        }
        Ok(())
    }

    fn equilibrium(&self, s: &mut CudaLatticeState) -> Result<()> {
        self.launch_equilibrium(&s.rho, &s.u, &mut s.feq)
    }

    fn update_fin(&self, s: &mut CudaLatticeState) -> Result<()> {
        // SAFETY: matches `lbm_update_fin(double*, const double*, int, int)`.
        unsafe {
            self.stream
                .launch_builder(&self.kernels.update_fin)
                .arg(&mut s.fin)
                .arg(&s.feq)
                .arg(&self.nx)
                .arg(&self.ny)
                .launch(self.plan.columns.into())
                .map_err(driver_err)?;
        }
        Ok(())
    }

    fn collision(&self, s: &mut CudaLatticeState) -> Result<()> {
        // SAFETY: matches `lbm_collision(const double*, const double*, const double*, double*, int, int)`.
        unsafe {
            self.stream
                .launch_builder(&self.kernels.collision)
                .arg(&s.omega)
                .arg(&s.fin)
                .arg(&s.feq)
                .arg(&mut s.fout)
                .arg(&self.nx)
                .arg(&self.ny)
                .launch(self.plan.sites.into())
                .map_err(driver_err)?;
        }
        Ok(())
    }

    fn bounce_back(&self, s: &mut CudaLatticeState) -> Result<()> {
        // SAFETY: matches `lbm_bounce_back(double*, const double*, const unsigned char*, int, int)`.
        unsafe {
            self.stream
                .launch_builder(&self.kernels.bounce_back)
                .arg(&mut s.fout)
                .arg(&s.fin)
                .arg(&s.obstacle)
                .arg(&self.nx)
                .arg(&self.ny)
                .launch(self.plan.sites.into())
                .map_err(driver_err)?;
        }
        Ok(())
    }

    fn streaming(&self, s: &mut CudaLatticeState) -> Result<()> {
        // SAFETY: matches `lbm_streaming(double*, const double*, int, int)`; `fin`
        // and `fout` are distinct allocations.
        unsafe {
            self.stream
                .launch_builder(&self.kernels.streaming)
                .arg(&mut s.fin)
                .arg(&s.fout)
                .arg(&self.nx)
                .arg(&self.ny)
                .launch(self.plan.sites.into())
                .map_err(driver_err)?;
        }
        Ok(())
    }

    fn read_macroscopic(&self, s: &CudaLatticeState) -> Result<(ScalarField, VectorField)> {
        self.synchronize()?;
        let rho = self.stream.memcpy_dtov(&s.rho).map_err(driver_err)?;
        let u = self.stream.memcpy_dtov(&s.u).map_err(driver_err)?;
        Ok((
            ScalarField::from_vec(s.nx, s.ny, rho)?,
            VectorField::from_vec(s.nx, s.ny, u)?,
        ))
    }

    fn synchronize(&self) -> Result<()> {
        self.stream.synchronize().map_err(driver_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::{KernelStage, ReferenceBackend};
    use crate::state::FieldId;

    #[test]
    #[ignore] // Requires CUDA hardware
    fn test_cuda_stages_match_reference() {
        let params = FlowParams::default().with_grid(64, 48);
        let cuda = CudaBackend::for_params(0, &params).unwrap();
        let reference = ReferenceBackend::default();

        let mut expected = LatticeState::new(&params).unwrap();
        reference.initialize(&mut expected).unwrap();

        for stage in KernelStage::PIPELINE {
            let mut device = cuda.upload(&expected).unwrap();
            let mut actual = expected.clone();
            reference.run_stage(stage, &mut expected).unwrap();
            cuda.run_stage(stage, &mut device).unwrap();
            cuda.download(&device, &mut actual).unwrap();

            for field in FieldId::ALL {
                let diff = expected.field_distance(&actual, field).unwrap();
                assert!(diff < 1e-10, "{stage}: {field} differs by {diff}");
            }
        }
    }

    #[test]
    #[ignore] // Requires CUDA hardware
    fn test_cuda_read_macroscopic() {
        let params = FlowParams::default().with_grid(32, 18);
        let cuda = CudaBackend::for_params(0, &params).unwrap();
        let host = LatticeState::new(&params).unwrap();
        let mut device = cuda.upload(&host).unwrap();
        cuda.initialize(&mut device).unwrap();
        cuda.macroscopic(&mut device).unwrap();

        let (rho, u) = cuda.read_macroscopic(&device).unwrap();
        assert!(rho.distance(&host.rho) < 1e-12);
        assert!(u.distance(&host.u) < 1e-12);
    }
}
