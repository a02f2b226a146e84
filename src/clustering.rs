//! Clustered light culling.
//!
//! The view frustum is split into a fixed 16×9×24 grid: 16×9 screen tiles, and 24 depth
//! slices spaced logarithmically between the near and far planes. Tile width and height are
//! sized independently so the grid covers the viewport at any aspect ratio. Each frame a
//! compute pass tests every point light's sphere against every cluster's view-space AABB
//! and writes the hits into a compact index list. The lighting pass then maps each pixel
//! to its cluster and only shades with that cluster's lights.
//!
//! # Passes
//!
//! 1. `cluster_build`: one AABB per cluster from the inverse projection. Only re-run when
//!    the [`ClusterCache`] key (projection matrix and screen size) changes.
//! 2. `cluster_cull`: one invocation per cluster, at most [`MAX_LIGHTS_PER_TILE`] lights
//!    each. Ranges in the global index list are claimed with an atomic counter.
//!
//! The CPU functions in this module ([`cluster_aabbs`], [`cull_lights_reference`]) mirror
//! the shaders exactly and exist for tests and tooling.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use crate::buffers::PointLightData;
use crate::error::RenderResult;
use crate::gpu::GpuContext;
use crate::hot_shader::{ShaderId, ShaderLibrary};

pub const GRID_SIZE_X: u32 = 16;
pub const GRID_SIZE_Y: u32 = 9;
pub const GRID_SIZE_Z: u32 = 24;
pub const NUM_CLUSTERS: u32 = GRID_SIZE_X * GRID_SIZE_Y * GRID_SIZE_Z;
pub const MAX_LIGHTS_PER_TILE: u32 = 100;
pub const MAX_LIGHTS: u32 = NUM_CLUSTERS * MAX_LIGHTS_PER_TILE;

/// Log-depth slicing constants: `slice = log2(depth) * scale + bias`.
pub fn log_depth_constants(near: f32, far: f32) -> (f32, f32) {
    let log_ratio = (far / near).log2();
    let scale = GRID_SIZE_Z as f32 / log_ratio;
    let bias = -(GRID_SIZE_Z as f32 * near.log2() / log_ratio);
    (scale, bias)
}

/// Width and height of one screen tile in pixels.
pub fn tile_sizes(dims: [u32; 2]) -> [u32; 2] {
    [dims[0].div_ceil(GRID_SIZE_X).max(1), dims[1].div_ceil(GRID_SIZE_Y).max(1)]
}

/// Flattened index of cluster `(x, y, z)`.
pub fn cluster_index(x: u32, y: u32, z: u32) -> u32 {
    x + y * GRID_SIZE_X + z * GRID_SIZE_X * GRID_SIZE_Y
}

/// Cluster containing a pixel (top-left origin) at a positive view depth.
pub fn cluster_for_fragment(
    pixel_x: f32,
    pixel_y: f32,
    view_depth: f32,
    tile_px: [u32; 2],
    scale: f32,
    bias: f32,
) -> u32 {
    let x = ((pixel_x / tile_px[0] as f32).floor() as u32).min(GRID_SIZE_X - 1);
    let y = ((pixel_y / tile_px[1] as f32).floor() as u32).min(GRID_SIZE_Y - 1);
    let z = ((view_depth.log2() * scale + bias).floor().max(0.0) as u32).min(GRID_SIZE_Z - 1);
    cluster_index(x, y, z)
}

/// View-space bounds of one cluster. Layout matches the shader's storage struct.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ClusterAabb {
    pub min: [f32; 4],
    pub max: [f32; 4],
}

impl ClusterAabb {
    pub fn min(&self) -> Vec3 {
        Vec4::from(self.min).truncate()
    }

    pub fn max(&self) -> Vec3 {
        Vec4::from(self.max).truncate()
    }
}

fn screen_to_view(inverse_projection: Mat4, pixel: [f32; 2], dims: [u32; 2]) -> Vec3 {
    let u = pixel[0] / dims[0] as f32;
    let v = pixel[1] / dims[1] as f32;
    let clip = Vec4::new(u * 2.0 - 1.0, 1.0 - v * 2.0, 0.0, 1.0);
    let view = inverse_projection * clip;
    view.truncate() / view.w
}

/// Point where the ray from the eye through `point` crosses the plane `z = depth`.
fn eye_ray_at_depth(point: Vec3, depth: f32) -> Vec3 {
    point * (depth / point.z)
}

/// CPU mirror of `cluster_build`: every cluster AABB in view space, by [`cluster_index`].
pub fn cluster_aabbs(
    inverse_projection: Mat4,
    dims: [u32; 2],
    near: f32,
    far: f32,
) -> Vec<ClusterAabb> {
    let [tile_w, tile_h] = tile_sizes(dims).map(|px| px as f32);
    let mut aabbs = vec![ClusterAabb::zeroed(); NUM_CLUSTERS as usize];

    for z in 0..GRID_SIZE_Z {
        let tile_near = -near * (far / near).powf(z as f32 / GRID_SIZE_Z as f32);
        let tile_far = -near * (far / near).powf((z + 1) as f32 / GRID_SIZE_Z as f32);

        for y in 0..GRID_SIZE_Y {
            for x in 0..GRID_SIZE_X {
                let min_screen = [x as f32 * tile_w, y as f32 * tile_h];
                let max_screen = [(x + 1) as f32 * tile_w, (y + 1) as f32 * tile_h];
                let a = screen_to_view(inverse_projection, min_screen, dims);
                let b = screen_to_view(inverse_projection, max_screen, dims);

                let corners = [
                    eye_ray_at_depth(a, tile_near),
                    eye_ray_at_depth(a, tile_far),
                    eye_ray_at_depth(b, tile_near),
                    eye_ray_at_depth(b, tile_far),
                ];
                let min = corners.iter().copied().fold(Vec3::splat(f32::MAX), Vec3::min);
                let max = corners.iter().copied().fold(Vec3::splat(f32::MIN), Vec3::max);

                aabbs[cluster_index(x, y, z) as usize] = ClusterAabb {
                    min: min.extend(0.0).to_array(),
                    max: max.extend(0.0).to_array(),
                };
            }
        }
    }

    aabbs
}

pub fn sphere_intersects_aabb(center: Vec3, radius: f32, aabb: &ClusterAabb) -> bool {
    let closest = center.clamp(aabb.min(), aabb.max());
    closest.distance_squared(center) <= radius * radius
}

/// CPU mirror of `cluster_cull`: light indices per cluster, in light order, truncated to
/// [`MAX_LIGHTS_PER_TILE`].
pub fn cull_lights_reference(
    aabbs: &[ClusterAabb],
    view: Mat4,
    lights: &[PointLightData],
) -> Vec<Vec<u32>> {
    let view_lights: Vec<(Vec3, f32, bool)> = lights
        .iter()
        .map(|l| {
            let p = view * Vec4::from(l.position).truncate().extend(1.0);
            (p.truncate(), l.range, l.enabled != 0)
        })
        .collect();

    aabbs
        .iter()
        .map(|aabb| {
            view_lights
                .iter()
                .enumerate()
                .filter(|(_, (center, range, enabled))| {
                    *enabled && sphere_intersects_aabb(*center, *range, aabb)
                })
                .map(|(i, _)| i as u32)
                .take(MAX_LIGHTS_PER_TILE as usize)
                .collect()
        })
        .collect()
}

/// Tracks the projection the cluster AABBs were built for.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ClusterCache {
    key: Option<([u32; 16], [u32; 2])>,
}

impl ClusterCache {
    /// Record `(projection, dims)` and return `true` if it differs from the last key.
    pub fn needs_rebuild(&mut self, projection: Mat4, dims: [u32; 2]) -> bool {
        let key = (projection.to_cols_array().map(f32::to_bits), dims);
        if self.key == Some(key) {
            return false;
        }
        self.key = Some(key);
        true
    }

    pub fn invalidate(&mut self) {
        self.key = None;
    }
}

/// `(offset, count)` into the light index list for one cluster.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct LightGridEntry {
    pub offset: u32,
    pub count: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct LightCounts {
    global_index_count: u32,
    light_count: u32,
    _pad: [u32; 2],
}

fn storage_entry(
    binding: u32,
    read_only: bool,
    visibility: wgpu::ShaderStages,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub(crate) struct ClusterPipelines {
    build: wgpu::ComputePipeline,
    cull: wgpu::ComputePipeline,
}

impl ClusterPipelines {
    pub(crate) fn new(
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        frame_layout: &wgpu::BindGroupLayout,
        cluster_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let layout = gpu
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Cluster Pipeline Layout"),
                bind_group_layouts: &[frame_layout, cluster_layout],
                push_constant_ranges: &[],
            });

        let compute = |id: ShaderId, label: &str| {
            gpu.device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(label),
                    layout: Some(&layout),
                    module: shaders.module(id),
                    entry_point: Some("main"),
                    compilation_options: Default::default(),
                    cache: None,
                })
        };

        Self {
            build: compute(ShaderId::ClusterBuild, "Cluster Build Pipeline"),
            cull: compute(ShaderId::ClusterCull, "Cluster Cull Pipeline"),
        }
    }
}

/// GPU buffers and pipelines for the cluster grid.
pub struct ClusterCulling {
    lights: wgpu::Buffer,
    aabbs: wgpu::Buffer,
    light_indices: wgpu::Buffer,
    light_grid: wgpu::Buffer,
    counts: wgpu::Buffer,
    light_capacity: u32,
    light_count: u32,
    cluster_layout: wgpu::BindGroupLayout,
    cluster_bind_group: wgpu::BindGroup,
    pipelines: ClusterPipelines,
    cache: ClusterCache,
}

impl ClusterCulling {
    pub fn new(
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        frame_layout: &wgpu::BindGroupLayout,
        light_capacity: u32,
    ) -> Self {
        let device = &gpu.device;
        let storage = |label: &str, size: u64, extra: wgpu::BufferUsages| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::STORAGE | extra,
                mapped_at_creation: false,
            })
        };

        let light_capacity = light_capacity.max(1);
        let lights = storage(
            "Point Light Storage Buffer",
            light_capacity as u64 * std::mem::size_of::<PointLightData>() as u64,
            wgpu::BufferUsages::COPY_DST,
        );
        let aabbs = storage(
            "Cluster AABB Storage Buffer",
            NUM_CLUSTERS as u64 * std::mem::size_of::<ClusterAabb>() as u64,
            wgpu::BufferUsages::COPY_SRC,
        );
        let light_indices = storage(
            "Light Index Storage Buffer",
            MAX_LIGHTS as u64 * 4,
            wgpu::BufferUsages::COPY_SRC,
        );
        let light_grid = storage(
            "Light Grid Storage Buffer",
            NUM_CLUSTERS as u64 * std::mem::size_of::<LightGridEntry>() as u64,
            wgpu::BufferUsages::COPY_SRC,
        );
        let counts = storage(
            "Light Counts Storage Buffer",
            std::mem::size_of::<LightCounts>() as u64,
            wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
        );

        let compute = wgpu::ShaderStages::COMPUTE;
        let cluster_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cluster Bind Group Layout"),
            entries: &[
                storage_entry(0, false, compute),
                storage_entry(1, true, compute),
                storage_entry(2, false, compute),
                storage_entry(3, false, compute),
                storage_entry(4, false, compute),
            ],
        });

        let cluster_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Cluster Bind Group"),
            layout: &cluster_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: aabbs.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: lights.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: light_indices.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: light_grid.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: counts.as_entire_binding(),
                },
            ],
        });

        let pipelines = ClusterPipelines::new(gpu, shaders, frame_layout, &cluster_layout);

        Self {
            lights,
            aabbs,
            light_indices,
            light_grid,
            counts,
            light_capacity,
            light_count: 0,
            cluster_layout,
            cluster_bind_group,
            pipelines,
            cache: ClusterCache::default(),
        }
    }

    pub(crate) fn build_pipelines(
        &self,
        gpu: &GpuContext,
        shaders: &ShaderLibrary,
        frame_layout: &wgpu::BindGroupLayout,
    ) -> ClusterPipelines {
        ClusterPipelines::new(gpu, shaders, frame_layout, &self.cluster_layout)
    }

    pub(crate) fn set_pipelines(&mut self, pipelines: ClusterPipelines) {
        self.pipelines = pipelines;
        self.cache.invalidate();
    }

    /// Upload this frame's lights and reset the global index counter.
    ///
    /// Lights past the buffer capacity were already dropped at submission.
    pub fn upload_lights(&mut self, gpu: &GpuContext, lights: &[PointLightData]) {
        let count = lights.len().min(self.light_capacity as usize);
        if count > 0 {
            gpu.queue
                .write_buffer(&self.lights, 0, bytemuck::cast_slice(&lights[..count]));
        }
        self.light_count = count as u32;
        let counts = LightCounts {
            global_index_count: 0,
            light_count: self.light_count,
            _pad: [0; 2],
        };
        gpu.queue.write_buffer(&self.counts, 0, bytemuck::bytes_of(&counts));
    }

    /// Record the cluster build (on a cache miss) and the light cull.
    ///
    /// Returns `true` if the AABBs were rebuilt.
    pub fn encode(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        frame_bind_group: &wgpu::BindGroup,
        projection: Mat4,
        dims: [u32; 2],
    ) -> bool {
        let rebuild = self.cache.needs_rebuild(projection, dims);
        if rebuild {
            log::debug!("rebuilding cluster AABBs for {}x{}", dims[0], dims[1]);
        }

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Cluster Compute Pass"),
            timestamp_writes: None,
        });
        pass.set_bind_group(0, frame_bind_group, &[]);
        pass.set_bind_group(1, &self.cluster_bind_group, &[]);

        if rebuild {
            pass.set_pipeline(&self.pipelines.build);
            pass.dispatch_workgroups(GRID_SIZE_X, GRID_SIZE_Y, GRID_SIZE_Z);
        }

        pass.set_pipeline(&self.pipelines.cull);
        pass.dispatch_workgroups(1, 1, GRID_SIZE_Z);

        rebuild
    }

    /// Point lights, light index list and light grid, in that order, for the lighting pass.
    pub(crate) fn lighting_buffers(&self) -> [&wgpu::Buffer; 3] {
        [&self.lights, &self.light_indices, &self.light_grid]
    }

    pub fn light_count(&self) -> u32 {
        self.light_count
    }

    pub fn light_capacity(&self) -> u32 {
        self.light_capacity
    }

    pub fn invalidate(&mut self) {
        self.cache.invalidate();
    }

    pub fn read_aabbs(&self, gpu: &GpuContext) -> RenderResult<Vec<ClusterAabb>> {
        let bytes = gpu.read_storage(&self.aabbs, self.aabbs.size())?;
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }

    pub fn read_light_grid(&self, gpu: &GpuContext) -> RenderResult<Vec<LightGridEntry>> {
        let bytes = gpu.read_storage(&self.light_grid, self.light_grid.size())?;
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }

    /// Light indices per cluster, as assembled from the grid and index list.
    pub fn read_cluster_lights(&self, gpu: &GpuContext) -> RenderResult<Vec<Vec<u32>>> {
        let grid = self.read_light_grid(gpu)?;
        let bytes = gpu.read_storage(&self.light_indices, self.light_indices.size())?;
        let indices: Vec<u32> = bytemuck::pod_collect_to_vec(&bytes);
        Ok(grid
            .iter()
            .map(|e| {
                let start = e.offset as usize;
                let end = (start + e.count as usize).min(indices.len());
                indices[start.min(end)..end].to_vec()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    const NEAR: f32 = 0.1;
    const FAR: f32 = 1000.0;
    const DIMS: [u32; 2] = [1920, 1080];

    fn projection() -> Mat4 {
        Mat4::perspective_rh(45f32.to_radians(), DIMS[0] as f32 / DIMS[1] as f32, NEAR, FAR)
    }

    #[test]
    fn log_depth_slices_span_near_to_far() {
        let (scale, bias) = log_depth_constants(NEAR, FAR);
        assert_relative_eq!(NEAR.log2() * scale + bias, 0.0, epsilon = 1e-4);
        assert_relative_eq!(FAR.log2() * scale + bias, GRID_SIZE_Z as f32, epsilon = 1e-3);
    }

    #[test]
    fn grid_constants() {
        assert_eq!(NUM_CLUSTERS, 3456);
        assert_eq!(MAX_LIGHTS, 345_600);
        assert_eq!(tile_sizes([1920, 1080]), [120, 120]);
        assert_eq!(tile_sizes([1921, 1081]), [121, 121]);
        assert_eq!(tile_sizes([512, 512]), [32, 57]);
        assert_eq!(tile_sizes([1024, 768]), [64, 86]);
    }

    #[test]
    fn slice_boundaries_match_fragment_mapping() {
        let (scale, bias) = log_depth_constants(NEAR, FAR);
        let aabbs = cluster_aabbs(projection().inverse(), DIMS, NEAR, FAR);
        let tile_px = tile_sizes(DIMS);

        for z in 0..GRID_SIZE_Z {
            let aabb = &aabbs[cluster_index(0, 0, z) as usize];
            // Middle of the slice in positive view depth
            let depth = (-aabb.max[2] * -aabb.min[2]).sqrt();
            let index = cluster_for_fragment(1.0, 1.0, depth, tile_px, scale, bias);
            assert_eq!(index, cluster_index(0, 0, z));
        }
    }

    fn assert_fragments_inside_their_clusters(dims: [u32; 2]) {
        let aspect = dims[0] as f32 / dims[1] as f32;
        let inverse = Mat4::perspective_rh(45f32.to_radians(), aspect, NEAR, FAR).inverse();
        let (scale, bias) = log_depth_constants(NEAR, FAR);
        let aabbs = cluster_aabbs(inverse, dims, NEAR, FAR);
        let tile_px = tile_sizes(dims);

        let mut pixels = vec![[dims[0] as f32 / 2.0, dims[1] as f32 - 12.0]];
        for i in 0..8 {
            for j in 0..8 {
                let x = (i as f32 + 0.5) / 8.0 * dims[0] as f32;
                let y = (j as f32 + 0.5) / 8.0 * dims[1] as f32;
                pixels.push([x, y]);
            }
        }
        pixels.push([0.5, dims[1] as f32 - 0.5]);
        pixels.push([dims[0] as f32 - 0.5, dims[1] as f32 - 0.5]);

        for [px, py] in pixels {
            for depth in [0.5, 3.0, 10.0, 75.0, 400.0] {
                let point = eye_ray_at_depth(screen_to_view(inverse, [px, py], dims), -depth);
                let index = cluster_for_fragment(px, py, depth, tile_px, scale, bias);
                let aabb = &aabbs[index as usize];
                let slack = Vec3::splat(1e-3 * depth);
                assert!(
                    point.cmpge(aabb.min() - slack).all() && point.cmple(aabb.max() + slack).all(),
                    "{dims:?}: pixel ({px}, {py}) at depth {depth} lies outside cluster {index}"
                );
            }
        }
    }

    #[test]
    fn square_viewport_fragments_land_in_their_cluster() {
        assert_fragments_inside_their_clusters([512, 512]);
    }

    #[test]
    fn four_by_three_fragments_land_in_their_cluster() {
        assert_fragments_inside_their_clusters([1024, 768]);
    }

    #[test]
    fn widescreen_fragments_land_in_their_cluster() {
        assert_fragments_inside_their_clusters(DIMS);
    }

    #[test]
    fn grid_covers_the_bottom_row_of_a_square_viewport() {
        let dims = [512, 512];
        let [_, tile_h] = tile_sizes(dims);
        assert!(tile_h * GRID_SIZE_Y >= dims[1]);
        let (scale, bias) = log_depth_constants(NEAR, FAR);
        let index = cluster_for_fragment(256.0, 500.0, 10.0, tile_sizes(dims), scale, bias);
        assert_eq!(index % (GRID_SIZE_X * GRID_SIZE_Y) / GRID_SIZE_X, GRID_SIZE_Y - 1);
    }

    #[test]
    fn aabbs_lie_in_front_of_the_camera() {
        let aabbs = cluster_aabbs(projection().inverse(), DIMS, NEAR, FAR);
        for aabb in &aabbs {
            assert!(aabb.max[2] <= -NEAR + 1e-4);
            assert!(aabb.min[2] >= -FAR - 1e-1);
            assert!(aabb.min[0] <= aabb.max[0]);
        }
        // Top-left tile sits left of and above the view axis
        let top_left = &aabbs[cluster_index(0, 0, 5) as usize];
        assert!(top_left.max[0] < 0.0);
        assert!(top_left.min[1] > 0.0);
    }

    #[test]
    fn sphere_box_intersection() {
        let aabb = ClusterAabb {
            min: [0.0, 0.0, 0.0, 0.0],
            max: [1.0, 1.0, 1.0, 0.0],
        };
        assert!(sphere_intersects_aabb(Vec3::splat(0.5), 0.1, &aabb));
        assert!(sphere_intersects_aabb(Vec3::new(2.0, 0.5, 0.5), 1.0, &aabb));
        assert!(!sphere_intersects_aabb(Vec3::new(2.0, 2.0, 2.0), 1.0, &aabb));
    }

    fn random_lights(count: usize, seed: u64) -> Vec<PointLightData> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|_| PointLightData {
                position: [
                    rng.gen_range(-50.0..50.0),
                    rng.gen_range(-50.0..50.0),
                    rng.gen_range(-50.0..50.0),
                    1.0,
                ],
                color: [1.0; 4],
                enabled: 1,
                intensity: 1.0,
                range: rng.gen_range(1.0..8.0),
                shadow_index: -1,
            })
            .collect()
    }

    #[test]
    fn reference_cull_agrees_with_brute_force_below_the_cap() {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y);
        let lights = random_lights(400, 7);
        let aabbs = cluster_aabbs(projection().inverse(), DIMS, NEAR, FAR);
        let culled = cull_lights_reference(&aabbs, view, &lights);

        for (aabb, hits) in aabbs.iter().zip(&culled) {
            let brute: Vec<u32> = lights
                .iter()
                .enumerate()
                .filter(|(_, l)| {
                    let p = (view * Vec4::from(l.position)).truncate();
                    sphere_intersects_aabb(p, l.range, aabb)
                })
                .map(|(i, _)| i as u32)
                .collect();

            assert!(hits.len() <= MAX_LIGHTS_PER_TILE as usize);
            if brute.len() < MAX_LIGHTS_PER_TILE as usize {
                assert_eq!(hits, &brute);
            }
        }
    }

    #[test]
    fn reference_cull_truncates_and_skips_disabled() {
        let aabbs = vec![ClusterAabb {
            min: [-1.0, -1.0, -2.0, 0.0],
            max: [1.0, 1.0, -1.0, 0.0],
        }];
        let mut lights = vec![
            PointLightData {
                position: [0.0, 0.0, -1.5, 1.0],
                color: [1.0; 4],
                enabled: 1,
                intensity: 1.0,
                range: 1.0,
                shadow_index: -1,
            };
            150
        ];
        lights[0].enabled = 0;

        let culled = cull_lights_reference(&aabbs, Mat4::IDENTITY, &lights);
        assert_eq!(culled[0].len(), MAX_LIGHTS_PER_TILE as usize);
        assert_eq!(culled[0][0], 1);
    }

    #[test]
    fn cache_hits_until_projection_or_size_changes() {
        let mut cache = ClusterCache::default();
        assert!(cache.needs_rebuild(projection(), DIMS));
        assert!(!cache.needs_rebuild(projection(), DIMS));
        assert!(cache.needs_rebuild(projection(), [1280, 720]));
        let wider = Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, NEAR, FAR);
        assert!(cache.needs_rebuild(wider, [1280, 720]));
        cache.invalidate();
        assert!(cache.needs_rebuild(wider, [1280, 720]));
    }
}
