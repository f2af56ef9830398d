//! C ABI wrapper for the tonegen sound generator.
//!
//! Exposes create/destroy, the lifecycle calls (init / start / stop / release)
//! and every parameter setter and getter of [`SoundGenerator`].
//!
//! ABI notes
//! - All functions are `extern "C"` and `#[no_mangle]`.
//! - Opaque handle type: `TonegenGenerator` (heap-allocated; you own/delete it).
//! - Waveforms travel as `u8`: 0 sine, 1 triangle, 2 square, 3 sawtooth.
//!   Unknown tags read as sine.
//! - Every function tolerates a null handle and then does nothing (getters
//!   return 0 / false).
//!
//! Threading
//! - Unlike a render-callback API, the generator runs its own audio threads.
//!   All functions may be called from any thread.
//! - Callbacks fire on engine threads. `on_playing_changed` comes from the
//!   playback thread, `on_one_cycle` from whichever thread changed a parameter.
//!   `user_data` must be safe to use from those threads.

#![allow(clippy::not_unsafe_ptr_arg_deref)]

use std::ffi::c_void;
use std::sync::Arc;

use tonegen_engine::{CpalBackend, EngineConfig, EngineListener, SoundGenerator, Waveform};

/// Host callbacks. Any field may be null.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct TonegenCallbacks {
    pub user_data: *mut c_void,
    /// One period of the waveform plus a closing sample; `samples` is only
    /// valid for the duration of the call.
    pub on_one_cycle: Option<extern "C" fn(user_data: *mut c_void, samples: *const i32, len: usize)>,
    pub on_playing_changed: Option<extern "C" fn(user_data: *mut c_void, playing: bool)>,
}

struct HostListener(TonegenCallbacks);

// SAFETY: the header documents that `user_data` is used from engine threads;
// the host is responsible for making it thread-safe.
unsafe impl Send for HostListener {}
unsafe impl Sync for HostListener {}

impl EngineListener for HostListener {
    fn on_one_cycle(&self, samples: &[i32]) {
        if let Some(cb) = self.0.on_one_cycle {
            cb(self.0.user_data, samples.as_ptr(), samples.len());
        }
    }

    fn on_playing_changed(&self, playing: bool) {
        if let Some(cb) = self.0.on_playing_changed {
            cb(self.0.user_data, playing);
        }
    }
}

/// Opaque generator handle we hand to C.
pub struct TonegenGenerator {
    inner: SoundGenerator<CpalBackend>,
}

fn with<R>(gen: *const TonegenGenerator, default: R, f: impl FnOnce(&SoundGenerator<CpalBackend>) -> R) -> R {
    // SAFETY: non-null handles come from `tonegen_create` and stay valid until
    // `tonegen_destroy`; the generator only needs `&self`.
    match unsafe { gen.as_ref() } {
        Some(g) => f(&g.inner),
        None => default,
    }
}

// --- Creation / destruction -------------------------------------------------------

/// Create a generator on the default output device. `callbacks` may be null.
/// No device is opened until `tonegen_init`.
#[no_mangle]
pub extern "C" fn tonegen_create(callbacks: *const TonegenCallbacks) -> *mut TonegenGenerator {
    // SAFETY: a non-null pointer must point at a valid struct for this call; it is copied.
    let listener: Arc<dyn EngineListener> = match unsafe { callbacks.as_ref() } {
        Some(cb) => Arc::new(HostListener(*cb)),
        None => Arc::new(tonegen_engine::NullListener),
    };
    let inner = SoundGenerator::with_listener(CpalBackend::new(), EngineConfig::default(), listener);
    Box::into_raw(Box::new(TonegenGenerator { inner }))
}

/// Release everything and free the handle. Fades out first if playing.
#[no_mangle]
pub extern "C" fn tonegen_destroy(gen: *mut TonegenGenerator) {
    if !gen.is_null() {
        // SAFETY: pointer came from `tonegen_create` and is not used again.
        unsafe { drop(Box::from_raw(gen)); }
    }
}

// --- Lifecycle --------------------------------------------------------------------

/// Open the output at `sample_rate`. Returns false if no usable device/config.
#[no_mangle]
pub extern "C" fn tonegen_init(gen: *const TonegenGenerator, sample_rate: u32) -> bool {
    with(gen, false, |g| g.init(sample_rate))
}

#[no_mangle]
pub extern "C" fn tonegen_start(gen: *const TonegenGenerator) {
    with(gen, (), SoundGenerator::start);
}

/// Begin the fade-out and return immediately.
#[no_mangle]
pub extern "C" fn tonegen_stop(gen: *const TonegenGenerator) {
    with(gen, (), SoundGenerator::stop);
}

/// Block until a pending fade-out has completed.
#[no_mangle]
pub extern "C" fn tonegen_wait_until_idle(gen: *const TonegenGenerator) {
    with(gen, (), SoundGenerator::wait_until_idle);
}

/// Close the output. The handle stays valid and may be re-initialized.
#[no_mangle]
pub extern "C" fn tonegen_release(gen: *const TonegenGenerator) {
    with(gen, (), SoundGenerator::release);
}

#[no_mangle]
pub extern "C" fn tonegen_is_playing(gen: *const TonegenGenerator) -> bool {
    with(gen, false, SoundGenerator::is_playing)
}

// --- Generator parameters ---------------------------------------------------------

#[no_mangle]
pub extern "C" fn tonegen_set_frequency(gen: *const TonegenGenerator, hz: f32) {
    with(gen, (), |g| g.set_frequency(hz));
}

#[no_mangle]
pub extern "C" fn tonegen_get_frequency(gen: *const TonegenGenerator) -> f32 {
    with(gen, 0.0, SoundGenerator::frequency)
}

#[no_mangle]
pub extern "C" fn tonegen_set_amplitude(gen: *const TonegenGenerator, amplitude: f32) {
    with(gen, (), |g| g.set_amplitude(amplitude));
}

#[no_mangle]
pub extern "C" fn tonegen_get_amplitude(gen: *const TonegenGenerator) -> f32 {
    with(gen, 0.0, SoundGenerator::amplitude)
}

#[no_mangle]
pub extern "C" fn tonegen_set_waveform(gen: *const TonegenGenerator, waveform: u8) {
    with(gen, (), |g| g.set_waveform(Waveform::from_u8(waveform)));
}

#[no_mangle]
pub extern "C" fn tonegen_get_waveform(gen: *const TonegenGenerator) -> u8 {
    with(gen, 0, |g| g.waveform().as_u8())
}

#[no_mangle]
pub extern "C" fn tonegen_set_sample_rate(gen: *const TonegenGenerator, sample_rate: u32) {
    with(gen, (), |g| g.set_sample_rate(sample_rate));
}

#[no_mangle]
pub extern "C" fn tonegen_get_sample_rate(gen: *const TonegenGenerator) -> u32 {
    with(gen, 0, SoundGenerator::sample_rate)
}

/// Fade length in milliseconds, used from the next start.
#[no_mangle]
pub extern "C" fn tonegen_set_fade_duration(gen: *const TonegenGenerator, ms: u32) {
    with(gen, (), |g| g.set_fade_duration(ms));
}

#[no_mangle]
pub extern "C" fn tonegen_get_fade_duration(gen: *const TonegenGenerator) -> u32 {
    with(gen, 0, SoundGenerator::fade_duration)
}

#[no_mangle]
pub extern "C" fn tonegen_set_clean_start(gen: *const TonegenGenerator, enabled: bool) {
    with(gen, (), |g| g.set_clean_start(enabled));
}

// --- Snapshots --------------------------------------------------------------------

#[no_mangle]
pub extern "C" fn tonegen_set_auto_update_one_cycle_sample(gen: *const TonegenGenerator, enabled: bool) {
    with(gen, (), |g| g.set_auto_update_one_cycle_sample(enabled));
}

#[no_mangle]
pub extern "C" fn tonegen_refresh_one_cycle_data(gen: *const TonegenGenerator) {
    with(gen, (), SoundGenerator::refresh_one_cycle_data);
}

// --- Gain -------------------------------------------------------------------------

/// Linear volume in [0, 1]. With `recalc_decibel` the stored dB follows.
#[no_mangle]
pub extern "C" fn tonegen_set_volume(gen: *const TonegenGenerator, volume: f32, recalc_decibel: bool) {
    with(gen, (), |g| g.set_volume(volume, recalc_decibel));
}

#[no_mangle]
pub extern "C" fn tonegen_get_volume(gen: *const TonegenGenerator) -> f32 {
    with(gen, 0.0, SoundGenerator::volume)
}

#[no_mangle]
pub extern "C" fn tonegen_set_decibel(gen: *const TonegenGenerator, db: f32) {
    with(gen, (), |g| g.set_decibel(db));
}

#[no_mangle]
pub extern "C" fn tonegen_get_decibel(gen: *const TonegenGenerator) -> f32 {
    with(gen, 0.0, SoundGenerator::decibel)
}

/// Balance in [-1, 1]; -1 is left only, +1 right only.
#[no_mangle]
pub extern "C" fn tonegen_set_balance(gen: *const TonegenGenerator, balance: f32) {
    with(gen, (), |g| g.set_balance(balance));
}

#[no_mangle]
pub extern "C" fn tonegen_get_balance(gen: *const TonegenGenerator) -> f32 {
    with(gen, 0.0, SoundGenerator::balance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;
    use std::sync::Mutex;

    extern "C" fn record_cycle(user_data: *mut c_void, samples: *const i32, len: usize) {
        let lens = unsafe { &*(user_data as *const Mutex<Vec<(usize, i32)>>) };
        let first = unsafe { *samples };
        lens.lock().unwrap().push((len, first));
    }

    #[test]
    fn null_handle_is_ignored() {
        tonegen_set_frequency(ptr::null(), 440.0);
        tonegen_start(ptr::null());
        tonegen_destroy(ptr::null_mut());
        assert_eq!(tonegen_get_frequency(ptr::null()), 0.0);
        assert!(!tonegen_is_playing(ptr::null()));
        assert!(!tonegen_init(ptr::null(), 48_000));
    }

    #[test]
    fn parameters_round_trip_without_a_device() {
        let g = tonegen_create(ptr::null());
        tonegen_set_frequency(g, 440.0);
        tonegen_set_amplitude(g, 2.0);
        tonegen_set_waveform(g, 3);
        tonegen_set_balance(g, 0.25);
        tonegen_set_volume(g, 0.5, true);
        tonegen_set_fade_duration(g, 50);

        assert_eq!(tonegen_get_frequency(g), 440.0);
        assert_eq!(tonegen_get_amplitude(g), 1.0);
        assert_eq!(tonegen_get_waveform(g), 3);
        assert_eq!(tonegen_get_balance(g), 0.25);
        assert_eq!(tonegen_get_volume(g), 0.5);
        assert_eq!(tonegen_get_fade_duration(g), 50);

        tonegen_set_waveform(g, 200);
        assert_eq!(tonegen_get_waveform(g), 0);
        assert!(!tonegen_is_playing(g));
        tonegen_destroy(g);
    }

    #[test]
    fn one_cycle_callback_reaches_the_host() {
        let seen = Mutex::new(Vec::<(usize, i32)>::new());
        let callbacks = TonegenCallbacks {
            user_data: &seen as *const _ as *mut c_void,
            on_one_cycle: Some(record_cycle),
            on_playing_changed: None,
        };
        let g = tonegen_create(&callbacks);
        tonegen_set_frequency(g, 100.0);
        tonegen_set_waveform(g, 2);
        tonegen_refresh_one_cycle_data(g);
        tonegen_destroy(g);

        assert_eq!(*seen.lock().unwrap(), [(481, 32_767)]);
    }
}
