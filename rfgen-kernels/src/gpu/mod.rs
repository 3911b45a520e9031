//! CUDA backend: one thread block per sample.
//!
//! Entry points mirror [`crate::api`] and run the same validation. Device
//! buffers are allocated per call and dropped before returning; results are
//! copied back after the stream is synchronized.

mod kernels;

pub use kernels::{CudaKernel, BLOCK_THREADS, KERNEL, MAX_LOCAL_WIDTH};

use crate::{
    api::{self, ArdCall, ConvCall, SorfCall},
    diagonal::norm_constant,
    features::{
        feature_scale, ArcCosParams, ArdParams, Averaging, ConvRbfParams, MaxPoolParams,
        PolyParams, Pooling, RbfParams,
    },
    validation, Result, RfError, RfFloat, SORF_LAYERS,
};
use cudarc::{
    driver::{
        CudaContext, CudaFunction, CudaModule, CudaSlice, CudaStream, DeviceRepr, LaunchConfig,
        PushKernelArg, ValidAsZeroBits,
    },
    nvrtc::compile_ptx,
};
use ndarray::{Array2, Array3, ArrayView1, ArrayView2, ArrayView3};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, info};

/// Element types with device entry points.
pub trait GpuFloat: RfFloat + DeviceRepr + ValidAsZeroBits {}

impl GpuFloat for f32 {}
impl GpuFloat for f64 {}

/// Compiled module bound to one device and its default stream.
pub struct GpuContext {
    ordinal: usize,
    stream: Arc<CudaStream>,
    functions: HashMap<String, CudaFunction>,
}

fn load_functions(module: &Arc<CudaModule>) -> Result<HashMap<String, CudaFunction>> {
    let mut functions = HashMap::new();
    for name in KERNEL.funcs {
        for suffix in [f32::KERNEL_SUFFIX, f64::KERNEL_SUFFIX] {
            let symbol = format!("{name}_{suffix}");
            let function = module
                .load_function(&symbol)
                .map_err(|e| RfError::KernelCompile(format!("{symbol}: {e}")))?;
            functions.insert(symbol, function);
        }
    }
    Ok(functions)
}

fn to_i32(name: &str, value: usize) -> Result<i32> {
    i32::try_from(value).map_err(|_| RfError::invalid(name, value, "exceeds the device index range"))
}

fn launch_config<T>(rows: usize, width: usize) -> Result<LaunchConfig> {
    let blocks = u32::try_from(rows)
        .map_err(|_| RfError::KernelLaunch(format!("{rows} samples exceed the grid limit")))?;
    Ok(LaunchConfig {
        grid_dim: (blocks, 1, 1),
        block_dim: (BLOCK_THREADS, 1, 1),
        shared_mem_bytes: (width.min(MAX_LOCAL_WIDTH) * std::mem::size_of::<T>()) as u32,
    })
}

impl GpuContext {
    /// Creates a context on device `ordinal` and compiles [`KERNEL`].
    pub fn new(ordinal: usize) -> Result<Self> {
        let ctx = CudaContext::new(ordinal)?;
        let stream = ctx.default_stream();
        let start = std::time::Instant::now();
        let ptx = compile_ptx(KERNEL.src).map_err(|e| RfError::KernelCompile(format!("{e:?}")))?;
        let module = ctx.load_module(ptx)?;
        let functions = load_functions(&module)?;
        info!(
            ordinal,
            entry_points = functions.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "compiled cuda kernels"
        );
        Ok(Self {
            ordinal,
            stream,
            functions,
        })
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn has_function(&self, symbol: &str) -> bool {
        self.functions.contains_key(symbol)
    }

    fn function<T: GpuFloat>(&self, name: &str) -> Result<CudaFunction> {
        let symbol = format!("{name}_{}", T::KERNEL_SUFFIX);
        self.functions
            .get(&symbol)
            .cloned()
            .ok_or_else(|| RfError::KernelLaunch(format!("no entry point {symbol}")))
    }

    /// Global scratch row per sample, only needed beyond the shared tile width.
    fn scratch<T: GpuFloat>(&self, rows: usize, width: usize) -> Result<CudaSlice<T>> {
        let len = if width > MAX_LOCAL_WIDTH { rows * width } else { 1 };
        Ok(self.stream.alloc_zeros::<T>(len)?)
    }

    fn finish(&self, name: &str, rows: usize) -> Result<()> {
        self.stream
            .synchronize()
            .map_err(|e| RfError::KernelLaunch(format!("{name}: {e}")))?;
        debug!(kernel = name, rows, "cuda kernel finished");
        Ok(())
    }

    fn rbf_launch<T: GpuFloat>(
        &self,
        call: &SorfCall<T>,
        params: &RbfParams,
        with_grad: bool,
    ) -> Result<(Array2<f64>, Array3<f64>)> {
        let cols = 2 * call.chi.len();
        if call.rows == 0 {
            return Ok((Array2::zeros((0, cols)), Array3::zeros((0, cols, 1))));
        }
        let function = self.function::<T>("rbf_features")?;
        let d_x = self.stream.memcpy_stod(call.x)?;
        let d_radem = self.stream.memcpy_stod(call.diagonals.as_slice())?;
        let d_chi = self.stream.memcpy_stod(call.chi)?;
        let mut d_out = self.stream.alloc_zeros::<f64>(call.rows * cols)?;
        let mut d_grad = self
            .stream
            .alloc_zeros::<f64>(if with_grad { call.rows * cols } else { 1 })?;
        let mut d_scratch = self.scratch::<T>(call.rows, call.width)?;

        let width = to_i32("width", call.width)?;
        let radem_row_len = to_i32("radem", call.diagonals.row_len())?;
        let num_freqs = to_i32("chi", call.chi.len())?;
        let scale = feature_scale(params.beta, call.chi.len());
        let norm = norm_constant::<T>(call.width);
        let with_grad_flag = with_grad as i32;
        unsafe {
            self.stream
                .launch_builder(&function)
                .arg(&d_x)
                .arg(&d_radem)
                .arg(&d_chi)
                .arg(&mut d_out)
                .arg(&mut d_grad)
                .arg(&mut d_scratch)
                .arg(&width)
                .arg(&radem_row_len)
                .arg(&num_freqs)
                .arg(&params.sigma)
                .arg(&scale)
                .arg(&norm)
                .arg(&with_grad_flag)
                .launch(launch_config::<T>(call.rows, call.width)?)
                .map_err(|e| RfError::KernelLaunch(e.to_string()))?;
        }
        self.finish("rbf_features", call.rows)?;

        let output = api::output_array(self.stream.memcpy_dtov(&d_out)?, call.rows, cols)?;
        let gradient = if with_grad {
            api::gradient_array(self.stream.memcpy_dtov(&d_grad)?, call.rows, cols, 1)?
        } else {
            Array3::zeros((0, cols, 1))
        };
        Ok((output, gradient))
    }

    pub fn rbf_features<'a, T: GpuFloat>(
        &self,
        input: ArrayView3<'a, T>,
        radem: ArrayView3<'a, i8>,
        chi: ArrayView1<'a, T>,
        params: &RbfParams,
    ) -> Result<Array2<f64>> {
        validation::finite("sigma", params.sigma)?;
        validation::finite("beta", params.beta)?;
        let call = api::sorf_call(&input, &radem, &chi, SORF_LAYERS, 1)?;
        Ok(self.rbf_launch(&call, params, false)?.0)
    }

    pub fn rbf_gradient<'a, T: GpuFloat>(
        &self,
        input: ArrayView3<'a, T>,
        radem: ArrayView3<'a, i8>,
        chi: ArrayView1<'a, T>,
        params: &RbfParams,
    ) -> Result<(Array2<f64>, Array3<f64>)> {
        validation::finite("sigma", params.sigma)?;
        validation::finite("beta", params.beta)?;
        let call = api::sorf_call(&input, &radem, &chi, SORF_LAYERS, 1)?;
        self.rbf_launch(&call, params, true)
    }

    pub fn arccos_features<'a, T: GpuFloat>(
        &self,
        input: ArrayView3<'a, T>,
        radem: ArrayView3<'a, i8>,
        chi: ArrayView1<'a, T>,
        params: &ArcCosParams,
    ) -> Result<Array2<f64>> {
        validation::kernel_order(params.kernel_order)?;
        validation::finite("beta", params.beta)?;
        let call = api::sorf_call(&input, &radem, &chi, SORF_LAYERS, 1)?;
        let cols = call.chi.len();
        if call.rows == 0 {
            return Ok(Array2::zeros((0, cols)));
        }
        let function = self.function::<T>("arccos_features")?;
        let d_x = self.stream.memcpy_stod(call.x)?;
        let d_radem = self.stream.memcpy_stod(call.diagonals.as_slice())?;
        let d_chi = self.stream.memcpy_stod(call.chi)?;
        let mut d_out = self.stream.alloc_zeros::<f64>(call.rows * cols)?;
        let mut d_scratch = self.scratch::<T>(call.rows, call.width)?;

        let width = to_i32("width", call.width)?;
        let radem_row_len = to_i32("radem", call.diagonals.row_len())?;
        let num_freqs = to_i32("chi", cols)?;
        let kernel_order = params.kernel_order as i32;
        let scale = feature_scale(params.beta, cols);
        let norm = norm_constant::<T>(call.width);
        unsafe {
            self.stream
                .launch_builder(&function)
                .arg(&d_x)
                .arg(&d_radem)
                .arg(&d_chi)
                .arg(&mut d_out)
                .arg(&mut d_scratch)
                .arg(&width)
                .arg(&radem_row_len)
                .arg(&num_freqs)
                .arg(&kernel_order)
                .arg(&scale)
                .arg(&norm)
                .launch(launch_config::<T>(call.rows, call.width)?)
                .map_err(|e| RfError::KernelLaunch(e.to_string()))?;
        }
        self.finish("arccos_features", call.rows)?;
        api::output_array(self.stream.memcpy_dtov(&d_out)?, call.rows, cols)
    }

    pub fn poly_features<'a, T: GpuFloat>(
        &self,
        input: ArrayView3<'a, T>,
        radem: ArrayView3<'a, i8>,
        chi: ArrayView2<'a, T>,
        params: &PolyParams,
    ) -> Result<Array2<f64>> {
        let call = api::poly_call(&input, &radem, &chi, params, 1)?;
        let cols = call.chi.len() / params.degree;
        if call.rows == 0 {
            return Ok(Array2::zeros((0, cols)));
        }
        let function = self.function::<T>("poly_features")?;
        let d_x = self.stream.memcpy_stod(call.x)?;
        let d_radem = self.stream.memcpy_stod(call.diagonals.as_slice())?;
        let d_chi = self.stream.memcpy_stod(call.chi)?;
        let mut d_out = self.stream.alloc_zeros::<f64>(call.rows * cols)?;
        let mut d_scratch = self.scratch::<T>(call.rows, call.width)?;

        let width = to_i32("width", call.width)?;
        let radem_row_len = to_i32("radem", call.diagonals.row_len())?;
        let num_freqs = to_i32("chi", cols)?;
        let degree = to_i32("degree", params.degree)?;
        let scale = feature_scale(params.beta, cols);
        let norm = norm_constant::<T>(call.width);
        unsafe {
            self.stream
                .launch_builder(&function)
                .arg(&d_x)
                .arg(&d_radem)
                .arg(&d_chi)
                .arg(&mut d_out)
                .arg(&mut d_scratch)
                .arg(&width)
                .arg(&radem_row_len)
                .arg(&num_freqs)
                .arg(&degree)
                .arg(&scale)
                .arg(&norm)
                .launch(launch_config::<T>(call.rows, call.width)?)
                .map_err(|e| RfError::KernelLaunch(e.to_string()))?;
        }
        self.finish("poly_features", call.rows)?;
        api::output_array(self.stream.memcpy_dtov(&d_out)?, call.rows, cols)
    }

    fn conv_rbf_launch<T: GpuFloat>(
        &self,
        call: &ConvCall<T>,
        params: &ConvRbfParams,
        with_grad: bool,
    ) -> Result<(Array2<f64>, Array3<f64>)> {
        let rows = call.seqlengths.len();
        let cols = 2 * call.chi.len();
        let grad_len = if with_grad { rows * cols } else { 0 };
        if rows == 0 {
            return Ok((Array2::zeros((0, cols)), Array3::zeros((0, cols, 1))));
        }
        let function = self.function::<T>("conv_rbf_features")?;
        let d_x = self.stream.memcpy_stod(call.x)?;
        let d_seqlengths = self.stream.memcpy_stod(call.seqlengths)?;
        let d_radem = self.stream.memcpy_stod(call.diagonals.as_slice())?;
        let d_chi = self.stream.memcpy_stod(call.chi)?;
        let mut d_out = self.stream.alloc_zeros::<f64>(rows * cols)?;
        let mut d_grad = self.stream.alloc_zeros::<f64>(grad_len.max(1))?;
        let mut d_scratch = self.scratch::<T>(rows, call.shape.width)?;

        let seq_len = to_i32("seq_len", call.shape.seq_len)?;
        let dim = to_i32("dim", call.shape.dim)?;
        let conv_width = to_i32("conv_width", call.shape.conv_width)?;
        let width = to_i32("width", call.shape.width)?;
        let radem_row_len = to_i32("radem", call.diagonals.row_len())?;
        let num_freqs = to_i32("chi", call.chi.len())?;
        let scale = feature_scale(params.beta, call.chi.len());
        let averaging: i32 = match params.averaging {
            Averaging::None => 0,
            Averaging::Sqrt => 1,
            Averaging::Full => 2,
        };
        let norm = norm_constant::<T>(call.shape.width);
        let with_grad_flag = with_grad as i32;
        unsafe {
            self.stream
                .launch_builder(&function)
                .arg(&d_x)
                .arg(&d_seqlengths)
                .arg(&d_radem)
                .arg(&d_chi)
                .arg(&mut d_out)
                .arg(&mut d_grad)
                .arg(&mut d_scratch)
                .arg(&seq_len)
                .arg(&dim)
                .arg(&conv_width)
                .arg(&width)
                .arg(&radem_row_len)
                .arg(&num_freqs)
                .arg(&params.sigma)
                .arg(&scale)
                .arg(&averaging)
                .arg(&norm)
                .arg(&with_grad_flag)
                .launch(launch_config::<T>(rows, call.shape.width)?)
                .map_err(|e| RfError::KernelLaunch(e.to_string()))?;
        }
        self.finish("conv_rbf_features", rows)?;

        let output = api::output_array(self.stream.memcpy_dtov(&d_out)?, rows, cols)?;
        let gradient = if with_grad {
            api::gradient_array(self.stream.memcpy_dtov(&d_grad)?, rows, cols, 1)?
        } else {
            Array3::zeros((0, cols, 1))
        };
        Ok((output, gradient))
    }

    pub fn conv_rbf_features<'a, T: GpuFloat>(
        &self,
        input: ArrayView3<'a, T>,
        seqlengths: ArrayView1<'a, i32>,
        radem: ArrayView3<'a, i8>,
        chi: ArrayView1<'a, T>,
        params: &ConvRbfParams,
    ) -> Result<Array2<f64>> {
        validation::finite("sigma", params.sigma)?;
        validation::finite("beta", params.beta)?;
        let call = api::conv_call(&input, &seqlengths, &radem, &chi, params.conv_width, 1)?;
        Ok(self.conv_rbf_launch(&call, params, false)?.0)
    }

    pub fn conv_rbf_gradient<'a, T: GpuFloat>(
        &self,
        input: ArrayView3<'a, T>,
        seqlengths: ArrayView1<'a, i32>,
        radem: ArrayView3<'a, i8>,
        chi: ArrayView1<'a, T>,
        params: &ConvRbfParams,
    ) -> Result<(Array2<f64>, Array3<f64>)> {
        validation::finite("sigma", params.sigma)?;
        validation::finite("beta", params.beta)?;
        let call = api::conv_call(&input, &seqlengths, &radem, &chi, params.conv_width, 1)?;
        self.conv_rbf_launch(&call, params, true)
    }

    pub fn maxpool_features<'a, T: GpuFloat>(
        &self,
        input: ArrayView3<'a, T>,
        seqlengths: ArrayView1<'a, i32>,
        radem: ArrayView3<'a, i8>,
        chi: ArrayView1<'a, T>,
        params: &MaxPoolParams,
    ) -> Result<Array2<f64>> {
        let call = api::conv_call(&input, &seqlengths, &radem, &chi, params.conv_width, 1)?;
        let rows = call.seqlengths.len();
        let cols = call.chi.len();
        if rows == 0 {
            return Ok(Array2::zeros((0, cols)));
        }
        let function = self.function::<T>("conv_maxpool_features")?;
        let d_x = self.stream.memcpy_stod(call.x)?;
        let d_seqlengths = self.stream.memcpy_stod(call.seqlengths)?;
        let d_radem = self.stream.memcpy_stod(call.diagonals.as_slice())?;
        let d_chi = self.stream.memcpy_stod(call.chi)?;
        let mut d_out = self.stream.alloc_zeros::<f64>(rows * cols)?;
        let mut d_col_sums = self.stream.alloc_zeros::<f64>(rows * cols)?;
        let mut d_scratch = self.scratch::<T>(rows, call.shape.width)?;

        let seq_len = to_i32("seq_len", call.shape.seq_len)?;
        let dim = to_i32("dim", call.shape.dim)?;
        let conv_width = to_i32("conv_width", call.shape.conv_width)?;
        let width = to_i32("width", call.shape.width)?;
        let radem_row_len = to_i32("radem", call.diagonals.row_len())?;
        let num_freqs = to_i32("chi", cols)?;
        let minus_mean = (params.pooling == Pooling::MaxMinusMean) as i32;
        let norm = norm_constant::<T>(call.shape.width);
        unsafe {
            self.stream
                .launch_builder(&function)
                .arg(&d_x)
                .arg(&d_seqlengths)
                .arg(&d_radem)
                .arg(&d_chi)
                .arg(&mut d_out)
                .arg(&mut d_col_sums)
                .arg(&mut d_scratch)
                .arg(&seq_len)
                .arg(&dim)
                .arg(&conv_width)
                .arg(&width)
                .arg(&radem_row_len)
                .arg(&num_freqs)
                .arg(&minus_mean)
                .arg(&norm)
                .launch(launch_config::<T>(rows, call.shape.width)?)
                .map_err(|e| RfError::KernelLaunch(e.to_string()))?;
        }
        self.finish("conv_maxpool_features", rows)?;
        api::output_array(self.stream.memcpy_dtov(&d_out)?, rows, cols)
    }

    fn ard_launch<T: GpuFloat>(
        &self,
        call: &ArdCall<T>,
        params: &ArdParams,
        with_grad: bool,
    ) -> Result<(Array2<f64>, Array3<f64>)> {
        let num_freqs = call.weights.len() / call.dim;
        let cols = 2 * num_freqs;
        let groups = params.num_lengthscales;
        if call.rows == 0 {
            return Ok((Array2::zeros((0, cols)), Array3::zeros((0, cols, groups))));
        }
        let function = self.function::<T>("ard_features")?;
        let d_x = self.stream.memcpy_stod(call.x)?;
        let d_weights = self.stream.memcpy_stod(call.weights)?;
        let d_sigma_map = self.stream.memcpy_stod(call.sigma_map)?;
        let d_sigma_vals = self.stream.memcpy_stod(call.sigma_vals)?;
        let mut d_out = self.stream.alloc_zeros::<f64>(call.rows * cols)?;
        let grad_len = if with_grad { call.rows * cols * groups } else { 1 };
        let mut d_grad = self.stream.alloc_zeros::<f64>(grad_len)?;

        let nodes = to_i32("nodes", call.nodes)?;
        let dim = to_i32("dim", call.dim)?;
        let num_freqs_arg = to_i32("weights", num_freqs)?;
        let num_lengthscales = to_i32("num_lengthscales", groups)?;
        let scale = feature_scale(params.beta, num_freqs);
        let with_grad_flag = with_grad as i32;
        unsafe {
            self.stream
                .launch_builder(&function)
                .arg(&d_x)
                .arg(&d_weights)
                .arg(&d_sigma_map)
                .arg(&d_sigma_vals)
                .arg(&mut d_out)
                .arg(&mut d_grad)
                .arg(&nodes)
                .arg(&dim)
                .arg(&num_freqs_arg)
                .arg(&num_lengthscales)
                .arg(&scale)
                .arg(&with_grad_flag)
                .launch(launch_config::<T>(call.rows, 0)?)
                .map_err(|e| RfError::KernelLaunch(e.to_string()))?;
        }
        self.finish("ard_features", call.rows)?;

        let output = api::output_array(self.stream.memcpy_dtov(&d_out)?, call.rows, cols)?;
        let gradient = if with_grad {
            api::gradient_array(self.stream.memcpy_dtov(&d_grad)?, call.rows, cols, groups)?
        } else {
            Array3::zeros((0, cols, groups))
        };
        Ok((output, gradient))
    }

    pub fn ard_features<'a, T: GpuFloat>(
        &self,
        input: ArrayView3<'a, T>,
        weights: ArrayView2<'a, T>,
        sigma_map: ArrayView1<'a, i32>,
        sigma_vals: ArrayView1<'a, f64>,
        params: &ArdParams,
    ) -> Result<Array2<f64>> {
        let call = api::ard_call(&input, &weights, &sigma_map, &sigma_vals, params, 1)?;
        Ok(self.ard_launch(&call, params, false)?.0)
    }

    pub fn ard_gradient<'a, T: GpuFloat>(
        &self,
        input: ArrayView3<'a, T>,
        weights: ArrayView2<'a, T>,
        sigma_map: ArrayView1<'a, i32>,
        sigma_vals: ArrayView1<'a, f64>,
        params: &ArdParams,
    ) -> Result<(Array2<f64>, Array3<f64>)> {
        let call = api::ard_call(&input, &weights, &sigma_map, &sigma_vals, params, 1)?;
        self.ard_launch(&call, params, true)
    }
}

