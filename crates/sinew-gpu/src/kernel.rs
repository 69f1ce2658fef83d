//! The distance-constraint kernel: source, parameters and dispatch sizing.

use std::borrow::Cow;
use std::path::PathBuf;

use bytemuck::{Pod, Zeroable};
use sinew_types::{SinewError, SinewResult};

/// WGSL source compiled into the binary.
pub const DISTANCE_KERNEL_WGSL: &str = include_str!("../shaders/distance.wgsl");

/// Entry point of the distance kernel.
pub const DISTANCE_ENTRY_POINT: &str = "solve_distance";

/// Placeholder in the kernel source that [`KernelSource::specialize`]
/// replaces with the workgroup size.
pub const WORKGROUP_SIZE_PLACEHOLDER: &str = "WORKGROUP_SIZE";

/// Where the kernel source comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum KernelSource {
    /// The WGSL shipped with this crate.
    #[default]
    Embedded,
    /// WGSL loaded from disk at probe time. Must declare the same bindings
    /// and entry point as the embedded kernel, and size its workgroup with
    /// `@workgroup_size(WORKGROUP_SIZE)`.
    File(PathBuf),
}

impl KernelSource {
    /// Resolves the WGSL text.
    ///
    /// A missing or unreadable file is reported as
    /// [`SinewError::KernelUnavailable`].
    pub fn load(&self) -> SinewResult<Cow<'static, str>> {
        match self {
            KernelSource::Embedded => Ok(Cow::Borrowed(DISTANCE_KERNEL_WGSL)),
            KernelSource::File(path) => std::fs::read_to_string(path)
                .map(Cow::Owned)
                .map_err(|e| {
                    SinewError::KernelUnavailable(format!(
                        "kernel source {} unreadable: {e}",
                        path.display()
                    ))
                }),
        }
    }

    /// Loads the source and substitutes `workgroup_size` for every
    /// [`WORKGROUP_SIZE_PLACEHOLDER`].
    pub fn specialize(&self, workgroup_size: u32) -> SinewResult<String> {
        let wgsl = self.load()?;
        if !wgsl.contains(WORKGROUP_SIZE_PLACEHOLDER) {
            return Err(SinewError::KernelUnavailable(format!(
                "kernel source {} has no {WORKGROUP_SIZE_PLACEHOLDER} placeholder",
                self.describe()
            )));
        }
        Ok(wgsl.replace(WORKGROUP_SIZE_PLACEHOLDER, &format!("{workgroup_size}u")))
    }

    /// Short description for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            KernelSource::Embedded => "embedded".to_string(),
            KernelSource::File(path) => path.display().to_string(),
        }
    }
}

/// Opaque identifier of a compiled kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelHandle(pub u32);

/// Uniform parameters of one dispatch. Matches `Params` in `distance.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DistanceParams {
    pub stiffness: f32,
    pub dt: f32,
    /// Constraints covered by this dispatch.
    pub constraint_count: u32,
    pub particle_count: u32,
    /// First constraint of this dispatch within the constraint buffer.
    pub constraint_offset: u32,
    pub _pad: [u32; 3],
}

impl DistanceParams {
    pub fn new(stiffness: f32, dt: f32, constraint_count: u32, particle_count: u32) -> Self {
        Self {
            stiffness,
            dt,
            constraint_count,
            particle_count,
            constraint_offset: 0,
            _pad: [0; 3],
        }
    }

    /// Restricts the dispatch to `count` constraints starting at `offset`.
    pub fn with_range(mut self, offset: u32, count: u32) -> Self {
        self.constraint_offset = offset;
        self.constraint_count = count;
        self
    }
}

/// Workgroups needed to cover `count` constraints.
#[inline]
pub fn group_count(count: u32, workgroup_size: u32) -> u32 {
    count.div_ceil(workgroup_size.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_are_32_bytes() {
        assert_eq!(std::mem::size_of::<DistanceParams>(), 32);
    }

    #[test]
    fn group_count_rounds_up() {
        assert_eq!(group_count(0, 64), 0);
        assert_eq!(group_count(1, 64), 1);
        assert_eq!(group_count(64, 64), 1);
        assert_eq!(group_count(65, 64), 2);
        assert_eq!(group_count(1_001, 64), 16);
    }

    fn validate_wgsl(wgsl: &str) -> naga::Module {
        let module = naga::front::wgsl::parse_str(wgsl).unwrap_or_else(|e| panic!("{}", e.emit_to_string(wgsl)));
        naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all())
            .validate(&module)
            .unwrap_or_else(|e| panic!("{e:?}"));
        module
    }

    // ─── Kernel Source ───────────────────────────────────────

    #[test]
    fn embedded_kernel_validates_at_default_size() {
        let wgsl = KernelSource::Embedded.specialize(64).unwrap();
        let module = validate_wgsl(&wgsl);

        assert_eq!(module.entry_points.len(), 1);
        let entry = &module.entry_points[0];
        assert_eq!(entry.name, DISTANCE_ENTRY_POINT);
        assert_eq!(entry.stage, naga::ShaderStage::Compute);
        assert_eq!(entry.workgroup_size, [64, 1, 1]);
    }

    #[test]
    fn embedded_kernel_validates_at_other_sizes() {
        for size in [1, 128, 256] {
            let wgsl = KernelSource::Embedded.specialize(size).unwrap();
            let module = validate_wgsl(&wgsl);
            assert_eq!(module.entry_points[0].workgroup_size, [size, 1, 1]);
        }
    }

    #[test]
    fn specialize_replaces_every_placeholder() {
        let wgsl = KernelSource::Embedded.specialize(128).unwrap();
        assert!(!wgsl.contains(WORKGROUP_SIZE_PLACEHOLDER));
        assert!(wgsl.contains("@workgroup_size(128u)"));
    }

    #[test]
    fn source_without_placeholder_is_unavailable() {
        let path = std::env::temp_dir().join(format!("sinew_no_placeholder_{}.wgsl", std::process::id()));
        std::fs::write(&path, "@compute @workgroup_size(64) fn solve_distance() {}").unwrap();

        let result = KernelSource::File(path.clone()).specialize(64);
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(SinewError::KernelUnavailable(_))));
    }
}
