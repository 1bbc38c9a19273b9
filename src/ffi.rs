//! C ABI for registering observers from native code.
//!
//! Two entry points are exported:
//!
//! - [`HybridClrAddObs`] takes a C++ `Obs` object, the abstract observer class native
//!   plugins derive from. [`Obs`] and [`ObsVtable`] mirror its layout: a vtable
//!   pointer followed by four name pointers and the parameter count, with
//!   `OnMethodEnter` and `OnMethodExit` as the two virtual slots.
//! - [`hybridscope_add_raw_observer`] takes a plain C [`RawObserver`] record with
//!   function pointers and a `user_data` cookie, for plugins written in C.
//!
//! Both copy the four names into an owned [`TargetDescriptor`] and register with the
//! process-wide registry. The `Obs` object itself is kept, never freed: the registry
//! owns it for the rest of the process.
//!
//! ```c
//! class DamageObs : public Obs {
//! public:
//!     DamageObs() : Obs("Game.dll", "Core", "Player", "TakeDamage", 1) {}
//!     void OnMethodEnter(Arg *args, uint32_t argCount) override;
//!     void OnMethodExit(Arg *ret) override; /* ret is NULL for void */
//! };
//!
//! HybridClrAddObs(new DamageObs());
//! ```

use std::{
    ffi::{c_char, c_int, c_void, CStr},
    fmt, ptr,
};

use tracing::warn;

use crate::{
    hook::{CallContext, Observer, Registry, TargetDescriptor, ValueCarrier},
    Error, Result,
};

/// Virtual table of an [`Obs`] object.
///
/// The Itanium C++ ABI points the vtable pointer at the first virtual slot and
/// passes `this` as the first argument, which is the C calling convention used
/// here.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct ObsVtable {
    /// `virtual void OnMethodEnter(Arg *args, uint32_t argCount)`
    pub on_method_enter: unsafe extern "C" fn(*mut Obs, *mut ValueCarrier, u32),
    /// `virtual void OnMethodExit(Arg *ret)`
    pub on_method_exit: unsafe extern "C" fn(*mut Obs, *mut ValueCarrier),
}

/// The C++ `Obs` base class, as laid out in memory.
///
/// Native observers derive from it; their own fields follow these.
#[repr(C)]
#[derive(Debug)]
pub struct Obs {
    /// Pointer to the object's virtual table.
    pub vtable: *const ObsVtable,
    /// NUL-terminated module name.
    pub dll_name: *const c_char,
    /// NUL-terminated namespace; an empty string for global types.
    pub name_space: *const c_char,
    /// NUL-terminated declaring type name.
    pub class_name: *const c_char,
    /// NUL-terminated method name.
    pub method_name: *const c_char,
    /// Declared parameter count.
    pub method_count: c_int,
}

/// Entry callback: receives `user_data`, a pointer to `count` argument carriers
/// and `count`.
pub type RawEnterFn = unsafe extern "C" fn(*mut c_void, *const ValueCarrier, u32);

/// Exit callback: receives `user_data` and the return carrier, null for `void`.
pub type RawExitFn = unsafe extern "C" fn(*mut c_void, *const ValueCarrier);

/// Observer record for plain C plugins.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct RawObserver {
    /// NUL-terminated module name.
    pub dll_name: *const c_char,
    /// NUL-terminated namespace; an empty string for global types.
    pub name_space: *const c_char,
    /// NUL-terminated declaring type name.
    pub class_name: *const c_char,
    /// NUL-terminated method name.
    pub method_name: *const c_char,
    /// Declared parameter count. Must not be negative.
    pub param_count: c_int,
    /// Opaque pointer handed back to both callbacks.
    pub user_data: *mut c_void,
    /// Called before the real method runs. May be null.
    pub on_enter: Option<RawEnterFn>,
    /// Called after the real method returned. May be null.
    pub on_exit: Option<RawExitFn>,
}

/// An observer implemented by a C++ `Obs` object.
pub struct ClrObserver {
    target: TargetDescriptor,
    obs: *mut Obs,
    vtable: ObsVtable,
}

/// An observer implemented by C callbacks.
pub struct ForeignObserver {
    target: TargetDescriptor,
    user_data: *mut c_void,
    on_enter: Option<RawEnterFn>,
    on_exit: Option<RawExitFn>,
}

// SAFETY: the registration contract requires native observers to tolerate calls
// from any thread; the stored pointers are only ever passed back to them.
unsafe impl Send for ClrObserver {}
unsafe impl Sync for ClrObserver {}
unsafe impl Send for ForeignObserver {}
unsafe impl Sync for ForeignObserver {}

impl ClrObserver {
    /// Takes ownership of a native `Obs` object.
    ///
    /// The object is never freed; it must stay valid for the rest of the process.
    ///
    /// # Safety
    ///
    /// `obs` must be null or point to a live object with the [`Obs`] layout whose
    /// vtable holds valid function pointers. Every non-null name pointer must point
    /// to a NUL-terminated string valid for the duration of this call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NullPointer`] for a null object, vtable or name,
    /// [`Error::InvalidUtf8`] for a name that is not UTF-8, and
    /// [`Error::InvalidParamCount`] for a negative parameter count.
    pub unsafe fn from_obs(obs: *mut Obs) -> Result<Self> {
        let Some(header) = obs.as_ref() else {
            return Err(Error::NullPointer("obs"));
        };
        let Some(vtable) = header.vtable.as_ref() else {
            return Err(Error::NullPointer("vtable"));
        };

        let target = read_target(
            [
                (header.dll_name, "dll_Name"),
                (header.name_space, "name_space"),
                (header.class_name, "className"),
                (header.method_name, "methodName"),
            ],
            header.method_count,
        )?;

        Ok(Self {
            target,
            obs,
            vtable: *vtable,
        })
    }
}

impl Observer for ClrObserver {
    fn target(&self) -> &TargetDescriptor {
        &self.target
    }

    fn name(&self) -> String {
        format!("native:{}", self.target)
    }

    fn on_enter(&self, _call: &CallContext<'_>, args: &[ValueCarrier]) {
        // `Arg*` is mutable on the C++ side, so it gets its own copy.
        let mut args = args.to_vec();
        let count = u32::try_from(args.len()).unwrap_or(u32::MAX);
        // SAFETY: upheld by the caller of `from_obs`; `args` outlives the call.
        unsafe { (self.vtable.on_method_enter)(self.obs, args.as_mut_ptr(), count) };
    }

    fn on_exit(&self, _call: &CallContext<'_>, ret: Option<&ValueCarrier>) {
        let mut copy = ret.copied();
        let ret = copy.as_mut().map_or(ptr::null_mut(), ptr::from_mut);
        // SAFETY: upheld by the caller of `from_obs`; `copy` outlives the call.
        unsafe { (self.vtable.on_method_exit)(self.obs, ret) };
    }
}

impl fmt::Debug for ClrObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClrObserver")
            .field("target", &self.target)
            .field("obs", &self.obs)
            .finish()
    }
}

impl ForeignObserver {
    /// Copies a native observer record into an owned observer.
    ///
    /// # Safety
    ///
    /// Every non-null string pointer in `raw` must point to a NUL-terminated string
    /// that stays valid for the duration of this call. The callbacks, when present,
    /// must be safe to invoke from any thread with `raw.user_data` for the lifetime
    /// of the process.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NullPointer`] for a null name, [`Error::InvalidUtf8`] for a
    /// name that is not UTF-8, and [`Error::InvalidParamCount`] for a negative
    /// parameter count.
    pub unsafe fn from_raw(raw: &RawObserver) -> Result<Self> {
        let target = read_target(
            [
                (raw.dll_name, "dll_name"),
                (raw.name_space, "name_space"),
                (raw.class_name, "class_name"),
                (raw.method_name, "method_name"),
            ],
            raw.param_count,
        )?;

        Ok(Self {
            target,
            user_data: raw.user_data,
            on_enter: raw.on_enter,
            on_exit: raw.on_exit,
        })
    }
}

impl Observer for ForeignObserver {
    fn target(&self) -> &TargetDescriptor {
        &self.target
    }

    fn name(&self) -> String {
        format!("native:{}", self.target)
    }

    fn on_enter(&self, _call: &CallContext<'_>, args: &[ValueCarrier]) {
        if let Some(callback) = self.on_enter {
            let count = u32::try_from(args.len()).unwrap_or(u32::MAX);
            // SAFETY: upheld by the caller of `from_raw`; `args` outlives the call.
            unsafe { callback(self.user_data, args.as_ptr(), count) };
        }
    }

    fn on_exit(&self, _call: &CallContext<'_>, ret: Option<&ValueCarrier>) {
        if let Some(callback) = self.on_exit {
            let ret = ret.map_or(ptr::null(), ptr::from_ref);
            // SAFETY: upheld by the caller of `from_raw`; `ret` outlives the call.
            unsafe { callback(self.user_data, ret) };
        }
    }
}

impl fmt::Debug for ForeignObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignObserver")
            .field("target", &self.target)
            .field("has_enter", &self.on_enter.is_some())
            .field("has_exit", &self.on_exit.is_some())
            .finish()
    }
}

/// # Safety
///
/// Every name pointer must be null or point to a NUL-terminated string valid for
/// this call.
unsafe fn read_target(
    names: [(*const c_char, &'static str); 4],
    param_count: c_int,
) -> Result<TargetDescriptor> {
    let param_count =
        u32::try_from(param_count).map_err(|_| Error::InvalidParamCount(param_count))?;
    let [module, namespace, class, method] = names;

    Ok(TargetDescriptor::new(
        read_name(module)?,
        read_name(namespace)?,
        read_name(class)?,
        read_name(method)?,
        param_count,
    ))
}

/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string valid for this call.
unsafe fn read_name((ptr, field): (*const c_char, &'static str)) -> Result<String> {
    if ptr.is_null() {
        return Err(Error::NullPointer(field));
    }

    CStr::from_ptr(ptr)
        .to_str()
        .map(str::to_owned)
        .map_err(|source| Error::InvalidUtf8 { field, source })
}

/// Registers a C++ `Obs` object with the process-wide registry.
///
/// Matches the `void HybridClrAddObs(Obs *obs)` export native plugins link
/// against. Registration of a well-formed object always succeeds. Objects that
/// cannot be read (null pointers, names that are not UTF-8, a negative
/// `methodCount`) would never match a call site; they are dropped with a `warn`
/// log instead of being registered under a garbage identity. This is stricter than
/// treating malformed descriptors as a silent caller contract violation, and the
/// `void` signature leaves the log as the only report.
///
/// # Safety
///
/// See [`ClrObserver::from_obs`].
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn HybridClrAddObs(obs: *mut Obs) {
    match ClrObserver::from_obs(obs) {
        Ok(observer) => {
            Registry::global().register(observer);
        }
        Err(err) => warn!(error = %err, "rejected native observer"),
    }
}

/// Registers a C [`RawObserver`] record with the process-wide registry.
///
/// Returns `0` on success or the negative [`Error::code`] of the rejection. Unlike
/// registration from Rust, which accepts any descriptor, records with null
/// pointers, non-UTF-8 names or a negative parameter count are reported as errors
/// so the plugin can tell they will never match.
///
/// # Safety
///
/// `obs` must be null or point to a valid [`RawObserver`]; see
/// [`ForeignObserver::from_raw`] for the requirements on its fields.
#[no_mangle]
pub unsafe extern "C" fn hybridscope_add_raw_observer(obs: *const RawObserver) -> c_int {
    let result = match obs.as_ref() {
        Some(raw) => ForeignObserver::from_raw(raw),
        None => Err(Error::NullPointer("observer")),
    };

    match result {
        Ok(observer) => {
            Registry::global().register(observer);
            0
        }
        Err(err) => {
            warn!(error = %err, "rejected native observer");
            err.code()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        ffi::CString,
        mem::{offset_of, size_of},
    };

    use super::*;

    struct Names {
        module: CString,
        namespace: CString,
        class: CString,
        method: CString,
    }

    impl Names {
        fn new() -> Self {
            Self {
                module: CString::new("Game.dll").unwrap(),
                namespace: CString::new("").unwrap(),
                class: CString::new("Bootstrap").unwrap(),
                method: CString::new("Start").unwrap(),
            }
        }

        fn record(&self, param_count: c_int) -> RawObserver {
            RawObserver {
                dll_name: self.module.as_ptr(),
                name_space: self.namespace.as_ptr(),
                class_name: self.class.as_ptr(),
                method_name: self.method.as_ptr(),
                param_count,
                user_data: ptr::null_mut(),
                on_enter: None,
                on_exit: None,
            }
        }

        fn obs(&self, vtable: *const ObsVtable, method_count: c_int) -> Obs {
            Obs {
                vtable,
                dll_name: self.module.as_ptr(),
                name_space: self.namespace.as_ptr(),
                class_name: self.class.as_ptr(),
                method_name: self.method.as_ptr(),
                method_count,
            }
        }
    }

    unsafe extern "C" fn ignore_enter(_: *mut Obs, _: *mut ValueCarrier, _: u32) {}

    unsafe extern "C" fn ignore_exit(_: *mut Obs, _: *mut ValueCarrier) {}

    static IGNORE: ObsVtable = ObsVtable {
        on_method_enter: ignore_enter,
        on_method_exit: ignore_exit,
    };

    #[test]
    fn test_obs_layout_matches_cpp_class() {
        let word = size_of::<*const c_void>();
        assert_eq!(offset_of!(Obs, vtable), 0);
        assert_eq!(offset_of!(Obs, dll_name), word);
        assert_eq!(offset_of!(Obs, name_space), 2 * word);
        assert_eq!(offset_of!(Obs, class_name), 3 * word);
        assert_eq!(offset_of!(Obs, method_name), 4 * word);
        assert_eq!(offset_of!(Obs, method_count), 5 * word);
        assert_eq!(offset_of!(ObsVtable, on_method_exit), word);
    }

    #[test]
    fn test_from_obs_copies_names() {
        let names = Names::new();
        let mut obs = names.obs(&IGNORE, 0);
        let observer = unsafe { ClrObserver::from_obs(&mut obs) }.unwrap();

        assert_eq!(
            observer.target(),
            &TargetDescriptor::new("Game.dll", "", "Bootstrap", "Start", 0)
        );
    }

    #[test]
    fn test_from_obs_rejects_null_vtable_and_object() {
        let names = Names::new();
        let mut obs = names.obs(ptr::null(), 0);

        let err = unsafe { ClrObserver::from_obs(&mut obs) }.unwrap_err();
        assert!(matches!(err, Error::NullPointer("vtable")));

        let err = unsafe { ClrObserver::from_obs(ptr::null_mut()) }.unwrap_err();
        assert!(matches!(err, Error::NullPointer("obs")));
    }

    #[test]
    fn test_from_obs_rejects_negative_count() {
        let names = Names::new();
        let mut obs = names.obs(&IGNORE, -2);
        let err = unsafe { ClrObserver::from_obs(&mut obs) }.unwrap_err();
        assert!(matches!(err, Error::InvalidParamCount(-2)));
    }

    #[test]
    fn test_from_raw_copies_names() {
        let names = Names::new();
        let observer = unsafe { ForeignObserver::from_raw(&names.record(0)) }.unwrap();

        assert_eq!(
            observer.target(),
            &TargetDescriptor::new("Game.dll", "", "Bootstrap", "Start", 0)
        );
        assert_eq!(observer.name(), "native:[Game.dll]Bootstrap::Start/0");
    }

    #[test]
    fn test_from_raw_rejects_null_name() {
        let names = Names::new();
        let mut record = names.record(0);
        record.class_name = ptr::null();

        let err = unsafe { ForeignObserver::from_raw(&record) }.unwrap_err();
        assert!(matches!(err, Error::NullPointer("class_name")));
    }

    #[test]
    fn test_from_raw_rejects_invalid_utf8() {
        let names = Names::new();
        let bad = CString::new(vec![0xFF, 0xFE]).unwrap();
        let mut record = names.record(0);
        record.method_name = bad.as_ptr();

        let err = unsafe { ForeignObserver::from_raw(&record) }.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidUtf8 {
                field: "method_name",
                ..
            }
        ));
    }

    #[test]
    fn test_from_raw_rejects_negative_count() {
        let names = Names::new();
        let err = unsafe { ForeignObserver::from_raw(&names.record(-1)) }.unwrap_err();
        assert!(matches!(err, Error::InvalidParamCount(-1)));
    }

    #[test]
    fn test_add_raw_observer_null_record() {
        let code = unsafe { hybridscope_add_raw_observer(ptr::null()) };
        assert_eq!(code, Error::NullPointer("observer").code());
        assert!(code < 0);
    }
}
