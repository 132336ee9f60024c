// ============================================================================
// BACKGROUND REMOVAL — ONNX Runtime segmentation via dynamic loading
// ============================================================================
//
// Uses `libloading` to open onnxruntime at runtime so the binary has no
// compile-time dependency on ONNX Runtime. The user points the app at the
// runtime library and a matting model (IS-Net / BiRefNet style, 1024x1024
// input) in the AI panel. The model's foreground mask is multiplied into the
// image's alpha channel.

#![allow(unsafe_op_in_unsafe_fn)]

use image::RgbaImage;
use std::path::Path;

#[derive(Debug)]
pub enum RemoveBgError {
    LibraryNotFound(String),
    LibraryLoadFailed(String),
    ModelNotFound(String),
    ModelLoadFailed(String),
    ApiInitFailed(String),
    SessionCreateFailed(String),
    InferenceFailed(String),
    InvalidOutput(String),
}

impl std::fmt::Display for RemoveBgError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoveBgError::LibraryNotFound(p) => write!(f, "ONNX Runtime library not found: {}", p),
            RemoveBgError::LibraryLoadFailed(e) => {
                write!(f, "Failed to load ONNX Runtime library: {}", e)
            }
            RemoveBgError::ModelNotFound(p) => write!(f, "Model file not found: {}", p),
            RemoveBgError::ModelLoadFailed(e) => write!(f, "Failed to load model: {}", e),
            RemoveBgError::ApiInitFailed(e) => write!(f, "ONNX Runtime API init failed: {}", e),
            RemoveBgError::SessionCreateFailed(e) => write!(f, "Failed to create session: {}", e),
            RemoveBgError::InferenceFailed(e) => write!(f, "Inference failed: {}", e),
            RemoveBgError::InvalidOutput(e) => write!(f, "Invalid model output: {}", e),
        }
    }
}

/// Matting models in the IS-Net family take a square 1024x1024 input.
const MODEL_INPUT_SIZE: u32 = 1024;

/// ORT API version we target (compatible with ONNX Runtime 1.16+).
const ORT_API_VERSION: u32 = 18;

/// Versions older than this used a different vtable layout for version 18.
const ORT_MIN_VERSION: (u32, u32) = (1, 16);

// --- ONNX Runtime C API surface ----------------------------------------
// Opaque handles, only ever used behind raw pointers.

#[repr(C)]
struct OrtEnv {
    _private: [u8; 0],
}
#[repr(C)]
struct OrtSession {
    _private: [u8; 0],
}
#[repr(C)]
struct OrtSessionOptions {
    _private: [u8; 0],
}
#[repr(C)]
struct OrtValue {
    _private: [u8; 0],
}
#[repr(C)]
struct OrtMemoryInfo {
    _private: [u8; 0],
}
#[repr(C)]
struct OrtStatus {
    _private: [u8; 0],
}
#[repr(C)]
struct OrtRunOptions {
    _private: [u8; 0],
}
#[repr(C)]
struct OrtAllocator {
    _private: [u8; 0],
}
#[repr(C)]
struct OrtTensorTypeAndShapeInfo {
    _private: [u8; 0],
}

#[allow(dead_code)]
#[repr(u32)]
enum OrtLoggingLevel {
    Verbose = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
    Fatal = 4,
}

#[allow(dead_code)]
#[repr(u32)]
enum ONNXTensorElementDataType {
    Undefined = 0,
    Float = 1,
}

#[repr(i32)]
#[allow(dead_code)]
enum OrtAllocatorType {
    Invalid = -1,
    DeviceAllocator = 0,
    ArenaAllocator = 1,
}

#[repr(i32)]
#[allow(dead_code)]
enum OrtMemType {
    CpuInput = -2,
    CpuOutput = -1,
    Default = 0,
}

#[cfg(target_os = "windows")]
type OrtChar = u16;
#[cfg(not(target_os = "windows"))]
type OrtChar = std::ffi::c_char;

type CreateEnvFn = unsafe extern "C" fn(
    log_level: OrtLoggingLevel,
    logid: *const std::ffi::c_char,
    out: *mut *mut OrtEnv,
) -> *mut OrtStatus;

type CreateSessionOptionsFn =
    unsafe extern "C" fn(out: *mut *mut OrtSessionOptions) -> *mut OrtStatus;

type CreateSessionFn = unsafe extern "C" fn(
    env: *const OrtEnv,
    model_path: *const OrtChar,
    options: *const OrtSessionOptions,
    out: *mut *mut OrtSession,
) -> *mut OrtStatus;

type CreateTensorWithDataAsOrtValueFn = unsafe extern "C" fn(
    info: *const OrtMemoryInfo,
    data: *mut std::ffi::c_void,
    data_len: usize,
    shape: *const i64,
    shape_len: usize,
    element_type: ONNXTensorElementDataType,
    out: *mut *mut OrtValue,
) -> *mut OrtStatus;

type CreateCpuMemoryInfoFn = unsafe extern "C" fn(
    alloc_type: OrtAllocatorType,
    mem_type: OrtMemType,
    out: *mut *mut OrtMemoryInfo,
) -> *mut OrtStatus;

type RunFn = unsafe extern "C" fn(
    session: *mut OrtSession,
    run_options: *const OrtRunOptions,
    input_names: *const *const std::ffi::c_char,
    inputs: *const *const OrtValue,
    input_count: usize,
    output_names: *const *const std::ffi::c_char,
    output_count: usize,
    outputs: *mut *mut OrtValue,
) -> *mut OrtStatus;

type GetTensorMutableDataFn =
    unsafe extern "C" fn(value: *mut OrtValue, out: *mut *mut std::ffi::c_void) -> *mut OrtStatus;

type GetTensorTypeAndShapeFn = unsafe extern "C" fn(
    value: *const OrtValue,
    out: *mut *mut OrtTensorTypeAndShapeInfo,
) -> *mut OrtStatus;

type GetDimensionsCountFn =
    unsafe extern "C" fn(info: *const OrtTensorTypeAndShapeInfo, out: *mut usize) -> *mut OrtStatus;

type GetDimensionsFn = unsafe extern "C" fn(
    info: *const OrtTensorTypeAndShapeInfo,
    dim_values: *mut i64,
    dim_values_length: usize,
) -> *mut OrtStatus;

type SessionGetInputNameFn = unsafe extern "C" fn(
    session: *const OrtSession,
    index: usize,
    allocator: *mut OrtAllocator,
    out: *mut *mut std::ffi::c_char,
) -> *mut OrtStatus;

type SessionGetOutputNameFn = SessionGetInputNameFn;

type GetAllocatorWithDefaultOptionsFn =
    unsafe extern "C" fn(out: *mut *mut OrtAllocator) -> *mut OrtStatus;

type AllocatorFreeFn = unsafe extern "C" fn(
    allocator: *mut OrtAllocator,
    ptr: *mut std::ffi::c_void,
) -> *mut OrtStatus;

type SetIntraOpNumThreadsFn =
    unsafe extern "C" fn(options: *mut OrtSessionOptions, n: i32) -> *mut OrtStatus;

type SetGraphOptimizationLevelFn =
    unsafe extern "C" fn(options: *mut OrtSessionOptions, level: u32) -> *mut OrtStatus;

type ReleaseEnvFn = unsafe extern "C" fn(env: *mut OrtEnv);
type ReleaseSessionFn = unsafe extern "C" fn(session: *mut OrtSession);
type ReleaseSessionOptionsFn = unsafe extern "C" fn(options: *mut OrtSessionOptions);
type ReleaseValueFn = unsafe extern "C" fn(value: *mut OrtValue);
type ReleaseMemoryInfoFn = unsafe extern "C" fn(info: *mut OrtMemoryInfo);
type ReleaseTensorTypeAndShapeInfoFn = unsafe extern "C" fn(info: *mut OrtTensorTypeAndShapeInfo);
type ReleaseStatusFn = unsafe extern "C" fn(status: *mut OrtStatus);
type GetErrorMessageFn = unsafe extern "C" fn(status: *const OrtStatus) -> *const std::ffi::c_char;

/// OrtApiBase — the entry point struct returned by OrtGetApiBase().
#[repr(C)]
struct OrtApiBase {
    get_api: unsafe extern "C" fn(version: u32) -> *const std::ffi::c_void,
    get_version_string: unsafe extern "C" fn() -> *const std::ffi::c_char,
}

/// The OrtApi vtable is a struct of ~200 function pointers; we keep the raw
/// blob and index into it by field offset from onnxruntime_c_api.h.
struct OrtApi {
    raw: *const std::ffi::c_void,
}

impl OrtApi {
    unsafe fn get_fn<T>(&self, index: usize) -> T {
        let ptr = self.raw as *const *const std::ffi::c_void;
        let fn_ptr = *ptr.add(index);
        std::mem::transmute_copy(&fn_ptr)
    }

    // Indices counted from the official header (stable within an API version).
    fn get_error_message(&self) -> GetErrorMessageFn {
        unsafe { self.get_fn(2) }
    }
    fn create_env(&self) -> CreateEnvFn {
        unsafe { self.get_fn(3) }
    }
    fn create_session(&self) -> CreateSessionFn {
        unsafe { self.get_fn(7) }
    }
    fn run(&self) -> RunFn {
        unsafe { self.get_fn(9) }
    }
    fn create_session_options(&self) -> CreateSessionOptionsFn {
        unsafe { self.get_fn(10) }
    }
    fn set_graph_optimization_level(&self) -> SetGraphOptimizationLevelFn {
        unsafe { self.get_fn(23) }
    }
    fn set_intra_op_num_threads(&self) -> SetIntraOpNumThreadsFn {
        unsafe { self.get_fn(24) }
    }
    fn session_get_input_name(&self) -> SessionGetInputNameFn {
        unsafe { self.get_fn(36) }
    }
    fn session_get_output_name(&self) -> SessionGetOutputNameFn {
        unsafe { self.get_fn(37) }
    }
    fn create_tensor_with_data(&self) -> CreateTensorWithDataAsOrtValueFn {
        unsafe { self.get_fn(49) }
    }
    fn get_tensor_mutable_data(&self) -> GetTensorMutableDataFn {
        unsafe { self.get_fn(51) }
    }
    fn get_dimensions_count(&self) -> GetDimensionsCountFn {
        unsafe { self.get_fn(61) }
    }
    fn get_dimensions(&self) -> GetDimensionsFn {
        unsafe { self.get_fn(62) }
    }
    fn get_tensor_type_and_shape(&self) -> GetTensorTypeAndShapeFn {
        unsafe { self.get_fn(65) }
    }
    fn create_cpu_memory_info(&self) -> CreateCpuMemoryInfoFn {
        unsafe { self.get_fn(69) }
    }
    fn allocator_free(&self) -> AllocatorFreeFn {
        unsafe { self.get_fn(76) }
    }
    fn get_allocator_with_default_options(&self) -> GetAllocatorWithDefaultOptionsFn {
        unsafe { self.get_fn(78) }
    }
    fn release_env(&self) -> ReleaseEnvFn {
        unsafe { self.get_fn(92) }
    }
    fn release_status(&self) -> ReleaseStatusFn {
        unsafe { self.get_fn(93) }
    }
    fn release_memory_info(&self) -> ReleaseMemoryInfoFn {
        unsafe { self.get_fn(94) }
    }
    fn release_session(&self) -> ReleaseSessionFn {
        unsafe { self.get_fn(95) }
    }
    fn release_value(&self) -> ReleaseValueFn {
        unsafe { self.get_fn(96) }
    }
    fn release_tensor_type_and_shape_info(&self) -> ReleaseTensorTypeAndShapeInfoFn {
        unsafe { self.get_fn(99) }
    }
    fn release_session_options(&self) -> ReleaseSessionOptionsFn {
        unsafe { self.get_fn(100) }
    }
}

/// Extract the error message from an OrtStatus. Null status means success.
unsafe fn status_to_result(api: &OrtApi, status: *mut OrtStatus) -> Result<(), String> {
    if status.is_null() {
        Ok(())
    } else {
        let msg_ptr = (api.get_error_message())(status);
        let msg = if msg_ptr.is_null() {
            "Unknown error".to_string()
        } else {
            std::ffi::CStr::from_ptr(msg_ptr)
                .to_string_lossy()
                .into_owned()
        };
        (api.release_status())(status);
        Err(msg)
    }
}

/// Validate a runtime-library / model path before handing it to native code:
/// absolute, no `..` components, expected extension.
pub fn validate_path(path: &str, for_library: bool) -> Result<(), RemoveBgError> {
    use std::path::Component;
    let p = Path::new(path);

    if path.is_empty() {
        return Err(RemoveBgError::LibraryNotFound("Path is empty".to_string()));
    }
    if !p.is_absolute() {
        return Err(RemoveBgError::LibraryLoadFailed(
            "Path must be absolute".to_string(),
        ));
    }
    if p.components().any(|c| c == Component::ParentDir) {
        return Err(RemoveBgError::LibraryLoadFailed(
            "Path must not contain '..' components".to_string(),
        ));
    }

    let ext = p
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if for_library {
        if !["dll", "so", "dylib"].contains(&ext.as_str()) {
            return Err(RemoveBgError::LibraryLoadFailed(format!(
                "Expected a .dll/.so/.dylib file, got '.{}'",
                ext
            )));
        }
    } else if ext != "onnx" {
        return Err(RemoveBgError::ModelLoadFailed(format!(
            "Expected a .onnx model file, got '.{}'",
            ext
        )));
    }

    Ok(())
}

fn parse_ort_version(version: &str) -> Option<(u32, u32)> {
    let mut parts = version.split('.');
    let major: u32 = parts.next()?.trim().parse().ok()?;
    let minor: u32 = parts.next()?.trim().parse().ok()?;
    Some((major, minor))
}

/// Probe the ONNX Runtime library: load it, check the entry point, and
/// report its version. Rejects versions older than 1.16.
pub fn probe_runtime(lib_path: &str) -> Result<String, RemoveBgError> {
    validate_path(lib_path, true)?;
    if !Path::new(lib_path).exists() {
        return Err(RemoveBgError::LibraryNotFound(lib_path.to_string()));
    }

    unsafe {
        let lib = libloading::Library::new(lib_path)
            .map_err(|e| RemoveBgError::LibraryLoadFailed(format!("{}", e)))?;
        let get_api_base: libloading::Symbol<unsafe extern "C" fn() -> *const OrtApiBase> =
            lib.get(b"OrtGetApiBase").map_err(|e| {
                RemoveBgError::LibraryLoadFailed(format!("Symbol OrtGetApiBase not found: {}", e))
            })?;

        let api_base = get_api_base();
        if api_base.is_null() {
            return Err(RemoveBgError::ApiInitFailed(
                "OrtGetApiBase returned null".to_string(),
            ));
        }

        let version_ptr = ((*api_base).get_version_string)();
        let version = if version_ptr.is_null() {
            "unknown".to_string()
        } else {
            std::ffi::CStr::from_ptr(version_ptr)
                .to_string_lossy()
                .into_owned()
        };

        if let Some((major, minor)) = parse_ort_version(&version) {
            let (min_major, min_minor) = ORT_MIN_VERSION;
            if major < min_major || (major == min_major && minor < min_minor) {
                return Err(RemoveBgError::ApiInitFailed(format!(
                    "ONNX Runtime {} is too old. Minimum supported version is {}.{}.",
                    version, min_major, min_minor
                )));
            }
        }

        let api_ptr = ((*api_base).get_api)(ORT_API_VERSION);
        if api_ptr.is_null() {
            return Err(RemoveBgError::ApiInitFailed(format!(
                "OrtGetApi({}) returned null for runtime version {}",
                ORT_API_VERSION, version
            )));
        }

        Ok(version)
    }
}

/// ImageNet normalization constants used by the IS-Net model family.
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Resize to the model's square input, normalize with ImageNet mean/std, and
/// lay out channel-first. Returns [1, 3, size, size] data.
fn preprocess(input: &RgbaImage, size: u32) -> Vec<f32> {
    let resized =
        image::imageops::resize(input, size, size, image::imageops::FilterType::Lanczos3);

    let npixels = (size * size) as usize;
    let mut tensor = vec![0.0f32; 3 * npixels];
    for y in 0..size {
        for x in 0..size {
            let pixel = resized.get_pixel(x, y);
            let idx = (y * size + x) as usize;
            tensor[idx] = (pixel[0] as f32 / 255.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
            tensor[npixels + idx] = (pixel[1] as f32 / 255.0 - IMAGENET_MEAN[1]) / IMAGENET_STD[1];
            tensor[2 * npixels + idx] =
                (pixel[2] as f32 / 255.0 - IMAGENET_MEAN[2]) / IMAGENET_STD[2];
        }
    }
    tensor
}

/// Whether output values are already sigmoid-activated probabilities in
/// [0, 1], as opposed to raw logits. IS-Net emits probabilities; BiRefNet
/// emits logits.
fn is_probability_space(data: &[f32]) -> bool {
    if data.is_empty() {
        return false;
    }
    let step = (data.len() / 10000).max(1);
    let mut min_val = f32::MAX;
    let mut max_val = f32::MIN;
    for i in (0..data.len()).step_by(step) {
        min_val = min_val.min(data[i]);
        max_val = max_val.max(data[i]);
    }
    min_val >= -0.05 && max_val <= 1.05
}

#[inline]
fn to_probability(v: f32, already_prob: bool) -> f32 {
    if already_prob {
        v.clamp(0.0, 1.0)
    } else {
        1.0 / (1.0 + (-v).exp())
    }
}

/// Remap a foreground probability to an 8-bit alpha value with a steep
/// sigmoid transition around 0.5 so edges stay soft but decisive.
fn mask_alpha(prob: f32) -> u8 {
    let steepness = 12.0;
    let remapped = 1.0 / (1.0 + (-(prob - 0.5) * steepness).exp());
    (remapped * 255.0).clamp(0.0, 255.0) as u8
}

/// Resize the mask to the original dimensions and multiply it into the
/// image's alpha channel.
fn apply_mask(
    mask_probs: &[f32],
    mask_h: u32,
    mask_w: u32,
    original: &RgbaImage,
) -> RgbaImage {
    let (orig_w, orig_h) = original.dimensions();

    let mask_pixels: Vec<u8> = mask_probs.iter().map(|&p| mask_alpha(p)).collect();
    let mask_img = image::GrayImage::from_raw(mask_w, mask_h, mask_pixels)
        .unwrap_or_else(|| image::GrayImage::new(mask_w, mask_h));

    let resized_mask = if mask_w != orig_w || mask_h != orig_h {
        image::imageops::resize(
            &mask_img,
            orig_w,
            orig_h,
            image::imageops::FilterType::Lanczos3,
        )
    } else {
        mask_img
    };

    let mut output = original.clone();
    for y in 0..orig_h {
        for x in 0..orig_w {
            let mask_val = resized_mask.get_pixel(x, y)[0];
            let pixel = output.get_pixel_mut(x, y);
            let orig_alpha = pixel[3] as f32 / 255.0;
            let mask = mask_val as f32 / 255.0;
            pixel[3] = (orig_alpha * mask * 255.0).clamp(0.0, 255.0) as u8;
        }
    }
    output
}

#[cfg(target_os = "windows")]
fn encode_model_path(path: &str) -> Result<Vec<OrtChar>, RemoveBgError> {
    Ok(path.encode_utf16().chain(std::iter::once(0)).collect())
}

#[cfg(not(target_os = "windows"))]
fn encode_model_path(path: &str) -> Result<Vec<OrtChar>, RemoveBgError> {
    let c = std::ffi::CString::new(path)
        .map_err(|e| RemoveBgError::ModelLoadFailed(format!("Bad model path: {}", e)))?;
    Ok(c.as_bytes_with_nul()
        .iter()
        .map(|&b| b as OrtChar)
        .collect())
}

/// Run the full background-removal pipeline: load the runtime, create a
/// session for the matting model, run one inference on the image, and apply
/// the predicted foreground mask as alpha.
pub fn remove_background(
    lib_path: &str,
    model_path: &str,
    input: &RgbaImage,
) -> Result<RgbaImage, RemoveBgError> {
    validate_path(lib_path, true)?;
    validate_path(model_path, false)?;
    if !Path::new(lib_path).exists() {
        return Err(RemoveBgError::LibraryNotFound(lib_path.to_string()));
    }
    if !Path::new(model_path).exists() {
        return Err(RemoveBgError::ModelNotFound(model_path.to_string()));
    }
    crate::log_info!(
        "remove_background: {}x{} input, model {}",
        input.width(),
        input.height(),
        model_path
    );

    unsafe {
        let lib = libloading::Library::new(lib_path)
            .map_err(|e| RemoveBgError::LibraryLoadFailed(format!("{}", e)))?;
        let get_api_base: libloading::Symbol<unsafe extern "C" fn() -> *const OrtApiBase> = lib
            .get(b"OrtGetApiBase")
            .map_err(|e| RemoveBgError::LibraryLoadFailed(format!("Symbol not found: {}", e)))?;

        let api_base = get_api_base();
        if api_base.is_null() {
            return Err(RemoveBgError::ApiInitFailed(
                "OrtGetApiBase returned null".to_string(),
            ));
        }
        let api_ptr = ((*api_base).get_api)(ORT_API_VERSION);
        if api_ptr.is_null() {
            return Err(RemoveBgError::ApiInitFailed(format!(
                "OrtGetApi({}) returned null",
                ORT_API_VERSION
            )));
        }
        let api = OrtApi { raw: api_ptr };

        let mut env: *mut OrtEnv = std::ptr::null_mut();
        let log_id = std::ffi::CString::new("ThumbPop")
            .map_err(|e| RemoveBgError::ApiInitFailed(e.to_string()))?;
        status_to_result(
            &api,
            (api.create_env())(OrtLoggingLevel::Warning, log_id.as_ptr(), &mut env),
        )
        .map_err(RemoveBgError::ApiInitFailed)?;

        let mut session_options: *mut OrtSessionOptions = std::ptr::null_mut();
        status_to_result(&api, (api.create_session_options())(&mut session_options))
            .map_err(RemoveBgError::SessionCreateFailed)?;

        let num_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4) as i32;
        let _ = status_to_result(
            &api,
            (api.set_intra_op_num_threads())(session_options, num_threads),
        );
        // ORT_ENABLE_ALL
        let _ = status_to_result(
            &api,
            (api.set_graph_optimization_level())(session_options, 99),
        );

        let model_encoded = encode_model_path(model_path)?;
        let mut session: *mut OrtSession = std::ptr::null_mut();
        let create_status =
            (api.create_session())(env, model_encoded.as_ptr(), session_options, &mut session);
        if let Err(e) = status_to_result(&api, create_status) {
            (api.release_session_options())(session_options);
            (api.release_env())(env);
            return Err(RemoveBgError::ModelLoadFailed(e));
        }

        let mut allocator: *mut OrtAllocator = std::ptr::null_mut();
        status_to_result(
            &api,
            (api.get_allocator_with_default_options())(&mut allocator),
        )
        .map_err(|e| RemoveBgError::SessionCreateFailed(format!("Get allocator: {}", e)))?;

        let input_name = session_tensor_name(&api, session, 0, allocator, true)?;
        let output_name = session_tensor_name(&api, session, 0, allocator, false)?;

        // Preprocess and build the input tensor.
        let mut tensor_data = preprocess(input, MODEL_INPUT_SIZE);
        let tensor_shape: [i64; 4] = [1, 3, MODEL_INPUT_SIZE as i64, MODEL_INPUT_SIZE as i64];

        let mut memory_info: *mut OrtMemoryInfo = std::ptr::null_mut();
        status_to_result(
            &api,
            (api.create_cpu_memory_info())(
                OrtAllocatorType::ArenaAllocator,
                OrtMemType::Default,
                &mut memory_info,
            ),
        )
        .map_err(|e| RemoveBgError::InferenceFailed(format!("Create memory info: {}", e)))?;

        let mut input_tensor: *mut OrtValue = std::ptr::null_mut();
        let data_len = tensor_data.len() * std::mem::size_of::<f32>();
        status_to_result(
            &api,
            (api.create_tensor_with_data())(
                memory_info,
                tensor_data.as_mut_ptr() as *mut std::ffi::c_void,
                data_len,
                tensor_shape.as_ptr(),
                4,
                ONNXTensorElementDataType::Float,
                &mut input_tensor,
            ),
        )
        .map_err(|e| RemoveBgError::InferenceFailed(format!("Create input tensor: {}", e)))?;

        // Single input, single (refined) output.
        let input_name_c = std::ffi::CString::new(input_name)
            .map_err(|e| RemoveBgError::InferenceFailed(e.to_string()))?;
        let output_name_c = std::ffi::CString::new(output_name)
            .map_err(|e| RemoveBgError::InferenceFailed(e.to_string()))?;
        let input_names = [input_name_c.as_ptr()];
        let output_names = [output_name_c.as_ptr()];
        let input_tensors = [input_tensor as *const OrtValue];
        let mut output_tensor: *mut OrtValue = std::ptr::null_mut();

        let run_status = (api.run())(
            session,
            std::ptr::null(),
            input_names.as_ptr(),
            input_tensors.as_ptr(),
            1,
            output_names.as_ptr(),
            1,
            &mut output_tensor,
        );
        if let Err(e) = status_to_result(&api, run_status) {
            (api.release_value())(input_tensor);
            (api.release_memory_info())(memory_info);
            (api.release_session())(session);
            (api.release_session_options())(session_options);
            (api.release_env())(env);
            return Err(RemoveBgError::InferenceFailed(e));
        }

        // Read the output shape.
        let mut shape_info: *mut OrtTensorTypeAndShapeInfo = std::ptr::null_mut();
        status_to_result(
            &api,
            (api.get_tensor_type_and_shape())(output_tensor as *const _, &mut shape_info),
        )
        .map_err(|e| RemoveBgError::InvalidOutput(format!("Get output shape: {}", e)))?;
        let mut dim_count: usize = 0;
        let _ = status_to_result(&api, (api.get_dimensions_count())(shape_info, &mut dim_count));
        let mut dims = vec![0i64; dim_count];
        let _ = status_to_result(
            &api,
            (api.get_dimensions())(shape_info, dims.as_mut_ptr(), dim_count),
        );
        (api.release_tensor_type_and_shape_info())(shape_info);

        // Mask output is [1, 1, H, W] or [1, H, W].
        let (out_h, out_w) = match dims.len() {
            4 => (dims[2] as u32, dims[3] as u32),
            3 => (dims[1] as u32, dims[2] as u32),
            _ => {
                return Err(RemoveBgError::InvalidOutput(format!(
                    "Unexpected output rank: {:?}",
                    dims
                )));
            }
        };
        if out_h == 0 || out_w == 0 {
            return Err(RemoveBgError::InvalidOutput(format!(
                "Empty output shape: {:?}",
                dims
            )));
        }

        let mut out_data_ptr: *mut std::ffi::c_void = std::ptr::null_mut();
        status_to_result(
            &api,
            (api.get_tensor_mutable_data())(output_tensor, &mut out_data_ptr),
        )
        .map_err(|e| RemoveBgError::InvalidOutput(format!("Get tensor data: {}", e)))?;

        let total = (out_h * out_w) as usize;
        let out_slice = std::slice::from_raw_parts(out_data_ptr as *const f32, total);
        let is_prob = is_probability_space(out_slice);
        let probabilities: Vec<f32> = out_slice
            .iter()
            .map(|&v| to_probability(v, is_prob))
            .collect();

        let result = apply_mask(&probabilities, out_h, out_w, input);

        (api.release_value())(output_tensor);
        (api.release_value())(input_tensor);
        (api.release_memory_info())(memory_info);
        (api.release_session())(session);
        (api.release_session_options())(session_options);
        (api.release_env())(env);

        crate::log_info!("remove_background: done, mask {}x{}", out_w, out_h);
        Ok(result)
    }
}

unsafe fn session_tensor_name(
    api: &OrtApi,
    session: *mut OrtSession,
    index: usize,
    allocator: *mut OrtAllocator,
    input: bool,
) -> Result<String, RemoveBgError> {
    let mut name_ptr: *mut std::ffi::c_char = std::ptr::null_mut();
    let getter = if input {
        api.session_get_input_name()
    } else {
        api.session_get_output_name()
    };
    status_to_result(
        api,
        getter(session as *const _, index, allocator, &mut name_ptr),
    )
    .map_err(|e| RemoveBgError::SessionCreateFailed(format!("Get tensor name: {}", e)))?;

    let name = if name_ptr.is_null() {
        if input { "input" } else { "output" }.to_string()
    } else {
        let s = std::ffi::CStr::from_ptr(name_ptr)
            .to_string_lossy()
            .into_owned();
        (api.allocator_free())(allocator, name_ptr as *mut std::ffi::c_void);
        s
    };
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_validation_rejects_unsafe_inputs() {
        assert!(validate_path("", true).is_err());
        assert!(validate_path("relative/libonnxruntime.so", true).is_err());
        assert!(validate_path("/opt/../etc/libonnxruntime.so", true).is_err());
        assert!(validate_path("/opt/ort/libonnxruntime.txt", true).is_err());
        assert!(validate_path("/opt/ort/model.onnx", false).is_ok());
        assert!(validate_path("/opt/ort/model.bin", false).is_err());
        #[cfg(not(target_os = "windows"))]
        assert!(validate_path("/opt/ort/libonnxruntime.so", true).is_ok());
    }

    #[test]
    fn version_parsing() {
        assert_eq!(parse_ort_version("1.18.0"), Some((1, 18)));
        assert_eq!(parse_ort_version("1.16"), Some((1, 16)));
        assert_eq!(parse_ort_version("garbage"), None);
    }

    #[test]
    fn probability_space_detection() {
        assert!(is_probability_space(&[0.0, 0.3, 0.99, 1.0]));
        assert!(!is_probability_space(&[-4.2, 0.3, 7.8]));
        assert!(!is_probability_space(&[]));
    }

    #[test]
    fn sigmoid_applied_only_to_logits() {
        assert_eq!(to_probability(0.7, true), 0.7);
        assert!((to_probability(0.0, false) - 0.5).abs() < 1e-6);
        assert!(to_probability(10.0, false) > 0.99);
        assert_eq!(to_probability(1.5, true), 1.0);
    }

    #[test]
    fn mask_alpha_is_steep_around_midpoint() {
        assert!(mask_alpha(0.95) > 240);
        assert!(mask_alpha(0.05) < 15);
        let mid = mask_alpha(0.5);
        assert!((120..=135).contains(&mid));
    }

    #[test]
    fn apply_mask_multiplies_existing_alpha() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        img.put_pixel(1, 0, image::Rgba([0, 255, 0, 128]));

        // Full foreground on the left, full background on the right.
        let out = apply_mask(&[1.0, 0.0], 1, 2, &img);
        assert!(out.get_pixel(0, 0)[3] > 250);
        assert!(out.get_pixel(1, 0)[3] < 5);
    }

    #[test]
    fn preprocess_produces_chw_tensor() {
        let img = RgbaImage::from_pixel(4, 4, image::Rgba([255, 255, 255, 255]));
        let tensor = preprocess(&img, 8);
        assert_eq!(tensor.len(), 3 * 8 * 8);
        // White normalizes to (1 - mean) / std per channel.
        let expected_r = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        assert!((tensor[0] - expected_r).abs() < 1e-4);
    }
}
