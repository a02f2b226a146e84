//! Screen-space ambient occlusion kernel.
//!
//! The SSAO pass samples a hemisphere around each pixel's normal. The samples live in
//! `PostProcessingData::ssao_samples` and are generated once from the configured seed.
//! Samples cluster toward the origin so occluders close to the surface weigh more.

use rand::Rng;

use crate::buffers::SSAO_KERNEL_SIZE;

/// Length of sample `i`, growing quadratically from 0.1 to 1.
pub fn kernel_scale(i: usize) -> f32 {
    let t = i as f32 / SSAO_KERNEL_SIZE as f32;
    0.1 + (1.0 - 0.1) * t * t
}

/// Random tangent-space hemisphere samples (z up), `w` unused.
pub fn ssao_kernel(rng: &mut impl Rng) -> [[f32; 4]; SSAO_KERNEL_SIZE] {
    let mut kernel = [[0.0; 4]; SSAO_KERNEL_SIZE];
    for (i, sample) in kernel.iter_mut().enumerate() {
        let v = glam::Vec3::new(
            rng.r#gen::<f32>() * 2.0 - 1.0,
            rng.r#gen::<f32>() * 2.0 - 1.0,
            rng.r#gen::<f32>(),
        )
        .normalize_or(glam::Vec3::Z)
            * rng.r#gen::<f32>()
            * kernel_scale(i);
        *sample = v.extend(0.0).to_array();
    }
    kernel
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn scale_grows_quadratically() {
        assert_relative_eq!(kernel_scale(0), 0.1);
        assert_relative_eq!(kernel_scale(32), 0.1 + 0.9 * 0.25);
        assert!(kernel_scale(63) < 1.0);
    }

    #[test]
    fn samples_stay_in_the_scaled_hemisphere() {
        let kernel = ssao_kernel(&mut StdRng::seed_from_u64(42));
        for (i, s) in kernel.iter().enumerate() {
            let v = glam::Vec3::new(s[0], s[1], s[2]);
            assert!(v.z >= 0.0);
            assert!(v.length() <= kernel_scale(i) + 1e-5);
        }
    }

    #[test]
    fn same_seed_same_kernel() {
        let a = ssao_kernel(&mut StdRng::seed_from_u64(7));
        let b = ssao_kernel(&mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }
}
