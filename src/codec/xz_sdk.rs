//! Binding to the LZMA SDK xz decoder exported by the platform's `liblzma.so`
//!
//! Entry points are found through the library's dynamic symbol table, once
//! per process. `XzUnpacker_Code` changed signature in Android 10, which added
//! a `srcFinished` argument; the variant is picked per call from the platform
//! level.

use std::ffi::{c_int, c_void};
use std::ptr::NonNull;

use once_cell::sync::OnceCell;
use tracing::debug;

use super::{CodecError, CoderStatus, Progress, StreamDecoder};
use crate::config::{
    CRC64_GENERATE_TABLE, CRC_GENERATE_TABLE, LZMA_BASENAME, XZ_UNPACKER_CODE,
    XZ_UNPACKER_CONSTRUCT, XZ_UNPACKER_FREE, XZ_UNPACKER_IS_STREAM_WAS_FINISHED,
};
use crate::module::{Module, ModuleFlags};
use crate::platform::ApiLevel;

const SZ_OK: c_int = 0;
const CODER_FINISH_ANY: c_int = 0;

/// Size of `CXzUnpack`, rounded up.
const STATE_SIZE: usize = 4096;

/// `ISzAlloc`: the allocator vtable the SDK calls back into.
#[repr(C)]
struct SzAlloc {
    alloc: unsafe extern "C" fn(*const SzAlloc, usize) -> *mut c_void,
    free: unsafe extern "C" fn(*const SzAlloc, *mut c_void),
}

unsafe extern "C" fn sz_alloc(_alloc: *const SzAlloc, size: usize) -> *mut c_void {
    libc::malloc(size)
}

unsafe extern "C" fn sz_free(_alloc: *const SzAlloc, address: *mut c_void) {
    libc::free(address)
}

static ALLOCATOR: SzAlloc = SzAlloc {
    alloc: sz_alloc,
    free: sz_free,
};

type GenerateTableFn = unsafe extern "C" fn();
type ConstructFn = unsafe extern "C" fn(*mut c_void, *const SzAlloc);
type IsFinishedFn = unsafe extern "C" fn(*const c_void) -> c_int;
type FreeFn = unsafe extern "C" fn(*mut c_void);
type CodeFn = unsafe extern "C" fn(
    *mut c_void,
    *mut u8,
    *mut usize,
    *const u8,
    *mut usize,
    c_int,
    *mut c_int,
) -> c_int;
type CodeWithSrcFinishedFn = unsafe extern "C" fn(
    *mut c_void,
    *mut u8,
    *mut usize,
    *const u8,
    *mut usize,
    c_int,
    c_int,
    *mut c_int,
) -> c_int;

/// Resolved decoder entry points
#[derive(Debug)]
pub struct XzSdk {
    construct: ConstructFn,
    is_finished: IsFinishedFn,
    free: FreeFn,
    /// Either [`CodeFn`] or [`CodeWithSrcFinishedFn`], by platform level.
    code: NonNull<c_void>,
}

// SAFETY: the binding only holds addresses of functions in a loaded library.
unsafe impl Send for XzSdk {}
unsafe impl Sync for XzSdk {}

static BINDING: OnceCell<Option<XzSdk>> = OnceCell::new();

/// The process-wide binding, attempted once. `None` when the library or any
/// entry point is missing.
pub fn binding() -> Option<&'static XzSdk> {
    BINDING
        .get_or_init(|| {
            let sdk = bind();
            match &sdk {
                Some(_) => debug!(library = LZMA_BASENAME, "Bound xz decoder"),
                None => debug!(library = LZMA_BASENAME, "xz decoder unavailable"),
            }
            sdk
        })
        .as_ref()
}

fn bind() -> Option<XzSdk> {
    let library = Module::open_with(LZMA_BASENAME, ModuleFlags::EXPORTED, None)?;
    let entry = |name: &str| library.exported_function(name);

    let crc_generate = entry(CRC_GENERATE_TABLE)?;
    let crc64_generate = entry(CRC64_GENERATE_TABLE)?;
    let construct = entry(XZ_UNPACKER_CONSTRUCT)?;
    let is_finished = entry(XZ_UNPACKER_IS_STREAM_WAS_FINISHED)?;
    let free = entry(XZ_UNPACKER_FREE)?;
    let code = NonNull::new(entry(XZ_UNPACKER_CODE)? as *mut c_void)?;

    // SAFETY: each address is a defined function symbol of the SDK with the
    // signature given by its type.
    unsafe {
        std::mem::transmute::<usize, GenerateTableFn>(crc_generate)();
        std::mem::transmute::<usize, GenerateTableFn>(crc64_generate)();
        Some(XzSdk {
            construct: std::mem::transmute::<usize, ConstructFn>(construct),
            is_finished: std::mem::transmute::<usize, IsFinishedFn>(is_finished),
            free: std::mem::transmute::<usize, FreeFn>(free),
            code,
        })
    }
}

/// Opaque `CXzUnpack`
#[repr(C, align(16))]
struct DecoderState([u8; STATE_SIZE]);

/// One decoding session over the bound SDK.
pub struct XzDecoder<'a> {
    sdk: &'a XzSdk,
    state: Box<DecoderState>,
    level: ApiLevel,
}

impl<'a> XzDecoder<'a> {
    pub fn new(sdk: &'a XzSdk, level: ApiLevel) -> Self {
        let mut state = Box::new(DecoderState([0; STATE_SIZE]));
        // SAFETY: the state buffer is larger than `CXzUnpack` and the
        // allocator is static.
        unsafe { (sdk.construct)(state.0.as_mut_ptr().cast(), &ALLOCATOR) };
        Self { sdk, state, level }
    }

    fn state_ptr(&mut self) -> *mut c_void {
        self.state.0.as_mut_ptr().cast()
    }
}

impl StreamDecoder for XzDecoder<'_> {
    fn decode(&mut self, output: &mut [u8], input: &[u8]) -> Result<Progress, CodecError> {
        let mut produced = output.len();
        let mut consumed = input.len();
        let mut status: c_int = 0;
        let state = self.state_ptr();

        // SAFETY: the lengths bound both buffers and the SDK writes back how
        // much of each it used.
        let result = unsafe {
            if self.level >= ApiLevel::Q {
                let code = std::mem::transmute::<*mut c_void, CodeWithSrcFinishedFn>(
                    self.sdk.code.as_ptr(),
                );
                code(
                    state,
                    output.as_mut_ptr(),
                    &mut produced,
                    input.as_ptr(),
                    &mut consumed,
                    1,
                    CODER_FINISH_ANY,
                    &mut status,
                )
            } else {
                let code = std::mem::transmute::<*mut c_void, CodeFn>(self.sdk.code.as_ptr());
                code(
                    state,
                    output.as_mut_ptr(),
                    &mut produced,
                    input.as_ptr(),
                    &mut consumed,
                    CODER_FINISH_ANY,
                    &mut status,
                )
            }
        };
        if result != SZ_OK {
            return Err(CodecError::Decode(result));
        }

        Ok(Progress {
            consumed,
            produced,
            status: CoderStatus::from_raw(status),
        })
    }

    fn is_finished(&self) -> bool {
        // SAFETY: the state was constructed in `new` and is freed only on drop.
        unsafe { (self.sdk.is_finished)(self.state.0.as_ptr().cast()) != 0 }
    }
}

impl Drop for XzDecoder<'_> {
    fn drop(&mut self) {
        let state = self.state_ptr();
        // SAFETY: constructed in `new`, freed exactly once.
        unsafe { (self.sdk.free)(state) };
    }
}
