use anyhow::{Result, anyhow};
use egui::TexturesDelta;
use hdrviewer::color_space::{ColorSpace, PixelFormat};
use hdrviewer::error::PresentError;
use hdrviewer::metadata::Hdr10Metadata;
use hdrviewer::palette::{HEATMAP_LUT_WIDTH, HEATMAP_MAX_NITS, HEATMAP_MIN_NITS, Vertex, heatmap_gradient};
use hdrviewer::state::ShaderConstants;
use hdrviewer::swapchain::{BufferDesc, FRAME_COUNT, PresentationLayer};
use hdrviewer::texture::{MipLevel, TexelFormat, TextureData};
use log::{debug, error, info, warn};
use std::ffi::CString;
use std::mem::ManuallyDrop;
use windows::Win32::Foundation::*;
use windows::Win32::Graphics::Direct3D::Fxc::*;
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;
use windows::Win32::System::Threading::*;
use windows::core::{Interface, PCSTR};

// Shader-visible SRV slots. Every table binds two consecutive slots (t0, t1).
const SRV_INTERMEDIATE: u32 = 0;
const SRV_HEATMAP: u32 = 1;
const SRV_TEXTURE: u32 = 2;
const SRV_FONT: u32 = 3;
// t1 for tables starting at the font slot; holds a second heatmap view.
const SRV_PAD: u32 = 4;
const SRV_HEAP_SIZE: u32 = 5;

const INTERMEDIATE_FORMAT: DXGI_FORMAT = DXGI_FORMAT_R16G16B16A16_FLOAT;

// Per frame: scene vertices first, UI vertices after.
const UPLOAD_FRAME_STRIDE: usize = 2 * 1024 * 1024;
const UPLOAD_UI_OFFSET: usize = 512 * 1024;

pub fn dxgi_format(format: PixelFormat) -> DXGI_FORMAT {
    match format {
        PixelFormat::Rgba8Unorm => DXGI_FORMAT_R8G8B8A8_UNORM,
        PixelFormat::Rgb10A2Unorm => DXGI_FORMAT_R10G10B10A2_UNORM,
        PixelFormat::Rgba16Float => DXGI_FORMAT_R16G16B16A16_FLOAT,
    }
}

pub fn dxgi_color_space(color_space: ColorSpace) -> DXGI_COLOR_SPACE_TYPE {
    match color_space {
        ColorSpace::Rec709Srgb => DXGI_COLOR_SPACE_RGB_FULL_G22_NONE_P709,
        ColorSpace::Rec2020Pq => DXGI_COLOR_SPACE_RGB_FULL_G2084_NONE_P2020,
        ColorSpace::Rec709Linear => DXGI_COLOR_SPACE_RGB_FULL_G10_NONE_P709,
    }
}

fn texel_dxgi_format(format: TexelFormat) -> DXGI_FORMAT {
    match format {
        TexelFormat::Rgba8Unorm => DXGI_FORMAT_R8G8B8A8_UNORM,
        TexelFormat::Rgba8UnormSrgb => DXGI_FORMAT_R8G8B8A8_UNORM_SRGB,
        TexelFormat::Rgb10A2Unorm => DXGI_FORMAT_R10G10B10A2_UNORM,
        TexelFormat::Rgba16Float => DXGI_FORMAT_R16G16B16A16_FLOAT,
        TexelFormat::Rgba32Float => DXGI_FORMAT_R32G32B32A32_FLOAT,
    }
}

/// Pipelines that write into a back buffer of one particular format.
struct OutputPipelines {
    format: PixelFormat,
    present: ID3D12PipelineState,
    ui: ID3D12PipelineState,
}

pub struct Dx12Renderer {
    device: ID3D12Device,
    command_queue: ID3D12CommandQueue,
    swapchain: IDXGISwapChain4,
    rtv_heap: ID3D12DescriptorHeap,
    rtv_descriptor_size: u32,
    render_targets: Vec<ID3D12Resource>,
    srv_heap: ID3D12DescriptorHeap,
    srv_descriptor_size: u32,
    command_allocators: Vec<ID3D12CommandAllocator>,
    command_list: ID3D12GraphicsCommandList,
    fence: ID3D12Fence,
    fence_values: Vec<u64>,
    fence_event: HANDLE,
    frame_index: u32,
    width: u32,
    height: u32,
    format: PixelFormat,
    root_signature: ID3D12RootSignature,
    palette_pso: ID3D12PipelineState,
    texture_pso: ID3D12PipelineState,
    output_pipelines: Vec<OutputPipelines>,
    // scRGB scene target the present pass reads from
    intermediate: Option<ID3D12Resource>,
    intermediate_size: (u32, u32),
    upload_buffer: ID3D12Resource,
    upload_buffer_ptr: *mut u8,
    heatmap_texture: Option<ID3D12Resource>,
    hdr_texture: Option<ID3D12Resource>,
    texture_aspect: Option<f32>,
    font_texture: Option<ID3D12Resource>,
    // Upload buffers still referenced by the frame that recorded them.
    font_uploads: Vec<Vec<ID3D12Resource>>,
}

impl Dx12Renderer {
    pub fn new(hwnd: HWND, width: u32, height: u32, format: PixelFormat, warp: bool) -> Result<Self> {
        unsafe {
            let factory: IDXGIFactory4 = CreateDXGIFactory2(DXGI_CREATE_FACTORY_FLAGS(0))?;

            let mut device: Option<ID3D12Device> = None;
            if warp {
                let adapter: IDXGIAdapter = factory.EnumWarpAdapter()?;
                info!("using the WARP software adapter");
                D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_11_0, &mut device)?;
            } else {
                let adapter = get_hardware_adapter(&factory)?;
                D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_11_0, &mut device)?;
            }
            let device = device.ok_or_else(|| anyhow!("Failed to create device"))?;

            let command_queue: ID3D12CommandQueue = device.CreateCommandQueue(&D3D12_COMMAND_QUEUE_DESC {
                Type: D3D12_COMMAND_LIST_TYPE_DIRECT,
                ..Default::default()
            })?;

            let swapchain_desc = DXGI_SWAP_CHAIN_DESC1 {
                Width: width,
                Height: height,
                Format: dxgi_format(format),
                SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
                BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
                BufferCount: FRAME_COUNT,
                SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
                ..Default::default()
            };
            let swapchain: IDXGISwapChain1 =
                factory.CreateSwapChainForHwnd(&command_queue, hwnd, &swapchain_desc, None, None)?;
            // Space toggles fullscreen instead of Alt+Enter
            factory.MakeWindowAssociation(hwnd, DXGI_MWA_NO_ALT_ENTER)?;
            let swapchain: IDXGISwapChain4 = swapchain.cast()?;

            // One RTV per back buffer plus the intermediate target.
            let rtv_heap: ID3D12DescriptorHeap = device.CreateDescriptorHeap(&D3D12_DESCRIPTOR_HEAP_DESC {
                NumDescriptors: FRAME_COUNT + 1,
                Type: D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
                ..Default::default()
            })?;
            let rtv_descriptor_size = device.GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE_RTV);

            let srv_heap: ID3D12DescriptorHeap = device.CreateDescriptorHeap(&D3D12_DESCRIPTOR_HEAP_DESC {
                NumDescriptors: SRV_HEAP_SIZE,
                Type: D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
                Flags: D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE,
                ..Default::default()
            })?;
            let srv_descriptor_size = device.GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV);

            let mut command_allocators = Vec::with_capacity(FRAME_COUNT as usize);
            for _ in 0..FRAME_COUNT {
                let allocator: ID3D12CommandAllocator = device.CreateCommandAllocator(D3D12_COMMAND_LIST_TYPE_DIRECT)?;
                command_allocators.push(allocator);
            }
            let command_list: ID3D12GraphicsCommandList =
                device.CreateCommandList(0, D3D12_COMMAND_LIST_TYPE_DIRECT, &command_allocators[0], None)?;
            command_list.Close()?;

            let fence: ID3D12Fence = device.CreateFence(0, D3D12_FENCE_FLAG_NONE)?;
            let fence_event = CreateEventA(None, false, false, None)?;

            let root_signature = create_root_signature(&device)?;
            let prelude = shader_prelude();
            let palette_pso = create_quad_pso(
                &device,
                &root_signature,
                INTERMEDIATE_FORMAT,
                &format!("{prelude}{SCENE_SOLID_PS}"),
                false,
            )?;
            let texture_pso = create_quad_pso(
                &device,
                &root_signature,
                INTERMEDIATE_FORMAT,
                &format!("{prelude}{SCENE_TEXTURED_PS}"),
                false,
            )?;
            let mut output_pipelines = Vec::new();
            for target in [PixelFormat::Rgba8Unorm, PixelFormat::Rgb10A2Unorm, PixelFormat::Rgba16Float] {
                output_pipelines.push(OutputPipelines {
                    format: target,
                    present: create_present_pso(&device, &root_signature, dxgi_format(target), &prelude)?,
                    ui: create_quad_pso(
                        &device,
                        &root_signature,
                        dxgi_format(target),
                        &format!("{prelude}{UI_PS}"),
                        true,
                    )?,
                });
            }

            let upload_buffer = create_upload_buffer(&device, (UPLOAD_FRAME_STRIDE * FRAME_COUNT as usize) as u64)?;
            let mut upload_buffer_ptr: *mut std::ffi::c_void = std::ptr::null_mut();
            upload_buffer.Map(0, None, Some(&mut upload_buffer_ptr))?;

            let mut renderer = Self {
                device,
                command_queue,
                swapchain,
                rtv_heap,
                rtv_descriptor_size,
                render_targets: Vec::new(),
                srv_heap,
                srv_descriptor_size,
                command_allocators,
                command_list,
                fence,
                fence_values: vec![0; FRAME_COUNT as usize],
                fence_event,
                frame_index: 0,
                width,
                height,
                format,
                root_signature,
                palette_pso,
                texture_pso,
                output_pipelines,
                intermediate: None,
                intermediate_size: (0, 0),
                upload_buffer,
                upload_buffer_ptr: upload_buffer_ptr as *mut u8,
                heatmap_texture: None,
                hdr_texture: None,
                texture_aspect: None,
                font_texture: None,
                font_uploads: vec![Vec::new(); FRAME_COUNT as usize],
            };

            renderer.create_back_buffer_views()?;
            renderer.create_heatmap()?;
            info!("D3D12 renderer ready: {}x{} {:?}", width, height, format);
            Ok(renderer)
        }
    }

    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Aspect ratio of the loaded texture, if any.
    pub fn texture_aspect(&self) -> Option<f32> {
        self.texture_aspect
    }

    fn srv_cpu(&self, slot: u32) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        unsafe {
            D3D12_CPU_DESCRIPTOR_HANDLE {
                ptr: self.srv_heap.GetCPUDescriptorHandleForHeapStart().ptr
                    + (slot * self.srv_descriptor_size) as usize,
            }
        }
    }

    fn srv_gpu(&self, slot: u32) -> D3D12_GPU_DESCRIPTOR_HANDLE {
        unsafe {
            D3D12_GPU_DESCRIPTOR_HANDLE {
                ptr: self.srv_heap.GetGPUDescriptorHandleForHeapStart().ptr
                    + (slot * self.srv_descriptor_size) as u64,
            }
        }
    }

    fn rtv(&self, slot: u32) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        unsafe {
            D3D12_CPU_DESCRIPTOR_HANDLE {
                ptr: self.rtv_heap.GetCPUDescriptorHandleForHeapStart().ptr
                    + (slot * self.rtv_descriptor_size) as usize,
            }
        }
    }

    fn create_srv(&self, resource: &ID3D12Resource, format: DXGI_FORMAT, mip_levels: u32, slot: u32) {
        unsafe {
            self.device.CreateShaderResourceView(
                resource,
                Some(&D3D12_SHADER_RESOURCE_VIEW_DESC {
                    Format: format,
                    ViewDimension: D3D12_SRV_DIMENSION_TEXTURE2D,
                    Shader4ComponentMapping: D3D12_DEFAULT_SHADER_4_COMPONENT_MAPPING,
                    Anonymous: D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                        Texture2D: D3D12_TEX2D_SRV {
                            MipLevels: mip_levels,
                            ..Default::default()
                        },
                    },
                }),
                self.srv_cpu(slot),
            );
        }
    }

    /// Back buffer RTVs plus the intermediate target when the size changed.
    fn create_back_buffer_views(&mut self) -> Result<()> {
        unsafe {
            self.render_targets.clear();
            for i in 0..FRAME_COUNT {
                let resource: ID3D12Resource = self.swapchain.GetBuffer(i)?;
                self.device.CreateRenderTargetView(&resource, None, self.rtv(i));
                self.render_targets.push(resource);
            }

            if self.intermediate.is_none() || self.intermediate_size != (self.width, self.height) {
                let intermediate = create_intermediate_target(&self.device, self.width, self.height)?;
                self.device.CreateRenderTargetView(&intermediate, None, self.rtv(FRAME_COUNT));
                self.create_srv(&intermediate, INTERMEDIATE_FORMAT, 1, SRV_INTERMEDIATE);
                self.intermediate = Some(intermediate);
                self.intermediate_size = (self.width, self.height);
            }

            self.frame_index = self.swapchain.GetCurrentBackBufferIndex();
        }
        Ok(())
    }

    fn create_heatmap(&mut self) -> Result<()> {
        let data = heatmap_gradient(HEATMAP_LUT_WIDTH)
            .iter()
            .flatten()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let lut = TextureData {
            width: HEATMAP_LUT_WIDTH,
            height: 1,
            format: TexelFormat::Rgba32Float,
            mips: vec![MipLevel {
                width: HEATMAP_LUT_WIDTH,
                height: 1,
                data,
            }],
        };
        let texture = self.create_texture(&lut)?;
        self.create_srv(&texture, DXGI_FORMAT_R32G32B32A32_FLOAT, 1, SRV_HEATMAP);
        self.create_srv(&texture, DXGI_FORMAT_R32G32B32A32_FLOAT, 1, SRV_PAD);
        self.heatmap_texture = Some(texture);
        Ok(())
    }

    /// Replaces the displayed texture. Must be called between frames.
    pub fn upload_texture(&mut self, texture: &TextureData) -> Result<()> {
        let resource = self.create_texture(texture)?;
        self.create_srv(&resource, texel_dxgi_format(texture.format), texture.mip_count(), SRV_TEXTURE);
        self.hdr_texture = Some(resource);
        self.texture_aspect = Some(texture.aspect_ratio());
        Ok(())
    }

    /// Uploads every mip through a temporary buffer and waits for the copy.
    fn create_texture(&mut self, texture: &TextureData) -> Result<ID3D12Resource> {
        if texture.mips.is_empty() {
            return Err(anyhow!("texture has no mip levels"));
        }
        let format = texel_dxgi_format(texture.format);
        let mip_count = texture.mip_count();

        unsafe {
            let desc = D3D12_RESOURCE_DESC {
                Dimension: D3D12_RESOURCE_DIMENSION_TEXTURE2D,
                Width: texture.width as u64,
                Height: texture.height,
                DepthOrArraySize: 1,
                MipLevels: mip_count as u16,
                Format: format,
                SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
                Layout: D3D12_TEXTURE_LAYOUT_UNKNOWN,
                ..Default::default()
            };
            let mut resource: Option<ID3D12Resource> = None;
            self.device.CreateCommittedResource(
                &D3D12_HEAP_PROPERTIES {
                    Type: D3D12_HEAP_TYPE_DEFAULT,
                    ..Default::default()
                },
                D3D12_HEAP_FLAG_NONE,
                &desc,
                D3D12_RESOURCE_STATE_COPY_DEST,
                None,
                &mut resource,
            )?;
            let resource = resource.ok_or_else(|| anyhow!("Failed to create texture"))?;

            let mut layouts = vec![D3D12_PLACED_SUBRESOURCE_FOOTPRINT::default(); mip_count as usize];
            let mut num_rows = vec![0u32; mip_count as usize];
            let mut row_sizes = vec![0u64; mip_count as usize];
            let mut total_bytes = 0u64;
            self.device.GetCopyableFootprints(
                &desc,
                0,
                mip_count,
                0,
                Some(layouts.as_mut_ptr()),
                Some(num_rows.as_mut_ptr()),
                Some(row_sizes.as_mut_ptr()),
                Some(&mut total_bytes),
            );

            let upload = create_upload_buffer(&self.device, total_bytes)?;
            let mut mapped: *mut std::ffi::c_void = std::ptr::null_mut();
            upload.Map(0, None, Some(&mut mapped))?;
            let mapped = mapped as *mut u8;
            for (mip, layout) in texture.mips.iter().zip(&layouts) {
                let src_pitch = mip.row_pitch(texture.format);
                let dst_pitch = layout.Footprint.RowPitch as usize;
                for row in 0..mip.height as usize {
                    let src = &mip.data[row * src_pitch..(row + 1) * src_pitch];
                    std::ptr::copy_nonoverlapping(
                        src.as_ptr(),
                        mapped.add(layout.Offset as usize + row * dst_pitch),
                        src_pitch,
                    );
                }
            }
            upload.Unmap(0, None);

            self.wait_for_gpu()?;
            let allocator = &self.command_allocators[self.frame_index as usize];
            allocator.Reset()?;
            self.command_list.Reset(allocator, None)?;

            for (level, layout) in layouts.iter().enumerate() {
                let dst = D3D12_TEXTURE_COPY_LOCATION {
                    pResource: ManuallyDrop::new(Some(resource.clone())),
                    Type: D3D12_TEXTURE_COPY_TYPE_SUBRESOURCE_INDEX,
                    Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 {
                        SubresourceIndex: level as u32,
                    },
                };
                let src = D3D12_TEXTURE_COPY_LOCATION {
                    pResource: ManuallyDrop::new(Some(upload.clone())),
                    Type: D3D12_TEXTURE_COPY_TYPE_PLACED_FOOTPRINT,
                    Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 { PlacedFootprint: *layout },
                };
                self.command_list.CopyTextureRegion(&dst, 0, 0, 0, &src, None);
                // CopyTextureRegion took its own references.
                let _ = ManuallyDrop::into_inner(dst.pResource);
                let _ = ManuallyDrop::into_inner(src.pResource);
            }
            resource_barrier(
                &self.command_list,
                &resource,
                D3D12_RESOURCE_STATE_COPY_DEST,
                D3D12_RESOURCE_STATE_PIXEL_SHADER_RESOURCE,
            );
            self.command_list.Close()?;
            let command_lists = [Some(self.command_list.cast::<ID3D12CommandList>()?)];
            self.command_queue.ExecuteCommandLists(&command_lists);
            self.wait_for_gpu()?;

            debug!(
                "uploaded {}x{} {:?} texture ({} mips, {} bytes staged)",
                texture.width, texture.height, texture.format, mip_count, total_bytes
            );
            Ok(resource)
        }
    }

    pub fn update_font_texture(&mut self, textures_delta: &TexturesDelta) -> Result<()> {
        for (id, delta) in &textures_delta.set {
            if *id != egui::TextureId::Managed(0) {
                continue;
            }

            let egui::ImageData::Color(color) = &delta.image;
            let width = color.width() as u32;
            let height = color.height() as u32;
            let pixels: Vec<u8> = color.pixels.iter().flat_map(|c| [c.r(), c.g(), c.b(), c.a()]).collect();

            let (dest_x, dest_y, is_partial) = match delta.pos {
                Some([x, y]) => (x as u32, y as u32, true),
                None => (0, 0, false),
            };

            unsafe {
                let texture = if is_partial {
                    match &self.font_texture {
                        Some(tex) => tex.clone(),
                        None => continue,
                    }
                } else {
                    let mut texture: Option<ID3D12Resource> = None;
                    self.device.CreateCommittedResource(
                        &D3D12_HEAP_PROPERTIES {
                            Type: D3D12_HEAP_TYPE_DEFAULT,
                            ..Default::default()
                        },
                        D3D12_HEAP_FLAG_NONE,
                        &D3D12_RESOURCE_DESC {
                            Dimension: D3D12_RESOURCE_DIMENSION_TEXTURE2D,
                            Width: width as u64,
                            Height: height,
                            DepthOrArraySize: 1,
                            MipLevels: 1,
                            Format: DXGI_FORMAT_R8G8B8A8_UNORM,
                            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
                            Layout: D3D12_TEXTURE_LAYOUT_UNKNOWN,
                            ..Default::default()
                        },
                        D3D12_RESOURCE_STATE_COPY_DEST,
                        None,
                        &mut texture,
                    )?;
                    texture.ok_or_else(|| anyhow!("Failed to create font texture"))?
                };

                let row_pitch = (width * 4).next_multiple_of(D3D12_TEXTURE_DATA_PITCH_ALIGNMENT);
                let upload_buffer = create_upload_buffer(&self.device, (row_pitch * height) as u64)?;
                let mut mapped: *mut std::ffi::c_void = std::ptr::null_mut();
                upload_buffer.Map(0, None, Some(&mut mapped))?;
                let mapped = mapped as *mut u8;
                for (y, row) in pixels.chunks_exact((width * 4) as usize).enumerate() {
                    std::ptr::copy_nonoverlapping(row.as_ptr(), mapped.add(y * row_pitch as usize), row.len());
                }
                upload_buffer.Unmap(0, None);

                if is_partial {
                    resource_barrier(
                        &self.command_list,
                        &texture,
                        D3D12_RESOURCE_STATE_PIXEL_SHADER_RESOURCE,
                        D3D12_RESOURCE_STATE_COPY_DEST,
                    );
                }

                let dst = D3D12_TEXTURE_COPY_LOCATION {
                    pResource: ManuallyDrop::new(Some(texture.clone())),
                    Type: D3D12_TEXTURE_COPY_TYPE_SUBRESOURCE_INDEX,
                    Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 { SubresourceIndex: 0 },
                };
                let src = D3D12_TEXTURE_COPY_LOCATION {
                    pResource: ManuallyDrop::new(Some(upload_buffer.clone())),
                    Type: D3D12_TEXTURE_COPY_TYPE_PLACED_FOOTPRINT,
                    Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 {
                        PlacedFootprint: D3D12_PLACED_SUBRESOURCE_FOOTPRINT {
                            Offset: 0,
                            Footprint: D3D12_SUBRESOURCE_FOOTPRINT {
                                Format: DXGI_FORMAT_R8G8B8A8_UNORM,
                                Width: width,
                                Height: height,
                                Depth: 1,
                                RowPitch: row_pitch,
                            },
                        },
                    },
                };
                self.command_list.CopyTextureRegion(&dst, dest_x, dest_y, 0, &src, None);
                let _ = ManuallyDrop::into_inner(dst.pResource);
                let _ = ManuallyDrop::into_inner(src.pResource);

                resource_barrier(
                    &self.command_list,
                    &texture,
                    D3D12_RESOURCE_STATE_COPY_DEST,
                    D3D12_RESOURCE_STATE_PIXEL_SHADER_RESOURCE,
                );

                if !is_partial {
                    // The previous frame may still sample the old font view.
                    self.wait_for_gpu()?;
                    self.create_srv(&texture, DXGI_FORMAT_R8G8B8A8_UNORM, 1, SRV_FONT);
                    self.font_texture = Some(texture);
                }
                self.font_uploads[self.frame_index as usize].push(upload_buffer);
            }
        }
        Ok(())
    }

    pub fn begin_frame(&mut self) -> Result<()> {
        unsafe {
            let fence_value = self.fence_values[self.frame_index as usize];
            if self.fence.GetCompletedValue() < fence_value {
                self.fence.SetEventOnCompletion(fence_value, self.fence_event)?;
                WaitForSingleObject(self.fence_event, INFINITE);
            }
            self.font_uploads[self.frame_index as usize].clear();

            let allocator = &self.command_allocators[self.frame_index as usize];
            allocator.Reset()?;
            self.command_list.Reset(allocator, None)?;
            self.command_list.SetGraphicsRootSignature(&self.root_signature);
            self.command_list.SetDescriptorHeaps(&[Some(self.srv_heap.clone())]);
            self.command_list.RSSetViewports(&[D3D12_VIEWPORT {
                Width: self.width as f32,
                Height: self.height as f32,
                MaxDepth: 1.0,
                ..Default::default()
            }]);
            self.command_list.RSSetScissorRects(&[RECT {
                right: self.width as i32,
                bottom: self.height as i32,
                ..Default::default()
            }]);
            self.command_list.IASetPrimitiveTopology(D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST);
        }
        Ok(())
    }

    /// Copies vertices into this frame's slice of the upload buffer.
    fn stage_vertices(&self, offset: usize, capacity: usize, vertices: &[Vertex]) -> D3D12_VERTEX_BUFFER_VIEW {
        let vertex_size = std::mem::size_of::<Vertex>();
        let max_vertices = capacity / vertex_size / 3 * 3;
        let count = if vertices.len() > max_vertices {
            warn!("dropping {} vertices over the upload budget", vertices.len() - max_vertices);
            max_vertices
        } else {
            vertices.len()
        };
        let frame_offset = self.frame_index as usize * UPLOAD_FRAME_STRIDE + offset;

        unsafe {
            std::ptr::copy_nonoverlapping(
                vertices.as_ptr() as *const u8,
                self.upload_buffer_ptr.add(frame_offset),
                count * vertex_size,
            );
            D3D12_VERTEX_BUFFER_VIEW {
                BufferLocation: self.upload_buffer.GetGPUVirtualAddress() + frame_offset as u64,
                SizeInBytes: (count * vertex_size) as u32,
                StrideInBytes: vertex_size as u32,
            }
        }
    }

    fn set_constants(&self, constants: &ShaderConstants) {
        unsafe {
            self.command_list.SetGraphicsRoot32BitConstants(
                0,
                (std::mem::size_of::<ShaderConstants>() / 4) as u32,
                constants as *const _ as *const std::ffi::c_void,
                0,
            );
        }
    }

    /// First pass: draws scRGB geometry into the intermediate target.
    pub fn draw_scene(&self, vertices: &[Vertex], textured: bool, constants: &ShaderConstants) {
        let Some(intermediate) = &self.intermediate else {
            return;
        };
        unsafe {
            resource_barrier(
                &self.command_list,
                intermediate,
                D3D12_RESOURCE_STATE_PIXEL_SHADER_RESOURCE,
                D3D12_RESOURCE_STATE_RENDER_TARGET,
            );
            let rtv = self.rtv(FRAME_COUNT);
            self.command_list.OMSetRenderTargets(1, Some(&rtv), false, None);
            self.command_list.ClearRenderTargetView(rtv, &[0.0, 0.0, 0.0, 1.0], None);

            if !vertices.is_empty() {
                let textured = textured && self.hdr_texture.is_some();
                self.command_list.SetPipelineState(if textured { &self.texture_pso } else { &self.palette_pso });
                self.set_constants(constants);
                self.command_list.SetGraphicsRootDescriptorTable(1, self.srv_gpu(SRV_TEXTURE));
                let view = self.stage_vertices(0, UPLOAD_UI_OFFSET, vertices);
                self.command_list.IASetVertexBuffers(0, Some(&[view]));
                self.command_list.DrawInstanced(view.SizeInBytes / view.StrideInBytes, 1, 0, 0);
            }

            resource_barrier(
                &self.command_list,
                intermediate,
                D3D12_RESOURCE_STATE_RENDER_TARGET,
                D3D12_RESOURCE_STATE_PIXEL_SHADER_RESOURCE,
            );
        }
    }

    fn output_pipelines(&self) -> Option<&OutputPipelines> {
        self.output_pipelines.iter().find(|p| p.format == self.format)
    }

    /// Second pass: encodes the intermediate for the back buffer format.
    pub fn draw_present(&self, constants: &ShaderConstants) {
        let Some(pipelines) = self.output_pipelines() else {
            return;
        };
        unsafe {
            resource_barrier(
                &self.command_list,
                &self.render_targets[self.frame_index as usize],
                D3D12_RESOURCE_STATE_PRESENT,
                D3D12_RESOURCE_STATE_RENDER_TARGET,
            );
            let rtv = self.rtv(self.frame_index);
            self.command_list.OMSetRenderTargets(1, Some(&rtv), false, None);
            self.command_list.SetPipelineState(&pipelines.present);
            self.set_constants(constants);
            self.command_list.SetGraphicsRootDescriptorTable(1, self.srv_gpu(SRV_INTERMEDIATE));
            self.command_list.DrawInstanced(6, 1, 0, 0);
        }
    }

    /// egui panels on top of the encoded back buffer.
    pub fn draw_ui(&self, vertices: &[Vertex], constants: &ShaderConstants) {
        if vertices.is_empty() || self.font_texture.is_none() {
            return;
        }
        let Some(pipelines) = self.output_pipelines() else {
            return;
        };
        unsafe {
            self.command_list.SetPipelineState(&pipelines.ui);
            self.set_constants(constants);
            self.command_list.SetGraphicsRootDescriptorTable(1, self.srv_gpu(SRV_FONT));
            let view = self.stage_vertices(UPLOAD_UI_OFFSET, UPLOAD_FRAME_STRIDE - UPLOAD_UI_OFFSET, vertices);
            self.command_list.IASetVertexBuffers(0, Some(&[view]));
            self.command_list.DrawInstanced(view.SizeInBytes / view.StrideInBytes, 1, 0, 0);
        }
    }

    pub fn end_frame(&mut self) -> Result<()> {
        unsafe {
            resource_barrier(
                &self.command_list,
                &self.render_targets[self.frame_index as usize],
                D3D12_RESOURCE_STATE_RENDER_TARGET,
                D3D12_RESOURCE_STATE_PRESENT,
            );
            self.command_list.Close()?;

            let command_lists = [Some(self.command_list.cast::<ID3D12CommandList>()?)];
            self.command_queue.ExecuteCommandLists(&command_lists);

            self.swapchain.Present(1, DXGI_PRESENT(0)).ok()?;

            let fence_value = self.fence_values.iter().copied().max().unwrap_or(0) + 1;
            self.command_queue.Signal(&self.fence, fence_value)?;
            self.fence_values[self.frame_index as usize] = fence_value;

            self.frame_index = self.swapchain.GetCurrentBackBufferIndex();
        }
        Ok(())
    }

    fn wait_for_gpu(&mut self) -> Result<()> {
        unsafe {
            let fence_value = self.fence_values.iter().copied().max().unwrap_or(0) + 1;
            self.command_queue.Signal(&self.fence, fence_value)?;
            if self.fence.GetCompletedValue() < fence_value {
                self.fence.SetEventOnCompletion(fence_value, self.fence_event)?;
                WaitForSingleObject(self.fence_event, INFINITE);
            }
            self.fence_values.fill(fence_value);
        }
        Ok(())
    }
}

impl PresentationLayer for Dx12Renderer {
    fn wait_for_gpu_idle(&mut self) -> Result<(), PresentError> {
        self.wait_for_gpu().map_err(|e| PresentError::Sync(e.to_string()))
    }

    fn release_buffers(&mut self) {
        unsafe {
            for allocator in &self.command_allocators {
                if let Err(e) = allocator.Reset() {
                    warn!("command allocator reset failed: {e}");
                }
            }
        }
        self.render_targets.clear();
    }

    fn resize_buffers(&mut self, desc: &BufferDesc) -> Result<(), PresentError> {
        let rejected = |reason: String| PresentError::ResizeRejected {
            width: desc.width,
            height: desc.height,
            format: desc.format,
            reason,
        };
        unsafe {
            let current = self.swapchain.GetDesc1().map_err(|e| rejected(e.to_string()))?;
            self.swapchain
                .ResizeBuffers(
                    desc.buffer_count,
                    desc.width,
                    desc.height,
                    dxgi_format(desc.format),
                    DXGI_SWAP_CHAIN_FLAG(current.Flags as i32),
                )
                .map_err(|e| rejected(e.to_string()))?;
        }
        self.width = desc.width;
        self.height = desc.height;
        self.format = desc.format;
        Ok(())
    }

    fn acquire_buffers(&mut self) -> Result<u32, PresentError> {
        self.create_back_buffer_views()
            .map_err(|e| PresentError::Acquire(format!("{e:#}")))?;
        Ok(self.frame_index)
    }

    fn supports_color_space(&self, color_space: ColorSpace) -> bool {
        unsafe {
            match self.swapchain.CheckColorSpaceSupport(dxgi_color_space(color_space)) {
                Ok(flags) => flags & DXGI_SWAP_CHAIN_COLOR_SPACE_SUPPORT_FLAG_PRESENT.0 as u32 != 0,
                Err(e) => {
                    debug!("CheckColorSpaceSupport({color_space:?}) failed: {e}");
                    false
                }
            }
        }
    }

    fn set_color_space(&mut self, color_space: ColorSpace) -> Result<(), PresentError> {
        unsafe {
            self.swapchain.SetColorSpace1(dxgi_color_space(color_space)).map_err(|e| {
                error!("SetColorSpace1({color_space:?}) failed: {e}");
                PresentError::UnsupportedColorSpace(color_space)
            })
        }
    }

    fn set_hdr_metadata(&mut self, metadata: Option<&Hdr10Metadata>) -> Result<(), PresentError> {
        let result = unsafe {
            match metadata {
                Some(m) => {
                    let hdr10 = DXGI_HDR_METADATA_HDR10 {
                        RedPrimary: m.red_primary,
                        GreenPrimary: m.green_primary,
                        BluePrimary: m.blue_primary,
                        WhitePoint: m.white_point,
                        MaxMasteringLuminance: m.max_mastering_luminance,
                        MinMasteringLuminance: m.min_mastering_luminance,
                        MaxContentLightLevel: m.max_content_light_level,
                        MaxFrameAverageLightLevel: m.max_frame_average_light_level,
                    };
                    self.swapchain.SetHDRMetaData(
                        DXGI_HDR_METADATA_TYPE_HDR10,
                        std::mem::size_of::<DXGI_HDR_METADATA_HDR10>() as u32,
                        Some(&hdr10 as *const _ as *const std::ffi::c_void),
                    )
                }
                None => self.swapchain.SetHDRMetaData(DXGI_HDR_METADATA_TYPE_NONE, 0, None),
            }
        };
        result.map_err(|e| PresentError::MetadataRejected(e.to_string()))
    }
}

impl Drop for Dx12Renderer {
    fn drop(&mut self) {
        unsafe {
            let _ = self.wait_for_gpu();
            if !self.fence_event.is_invalid() {
                let _ = CloseHandle(self.fence_event);
            }
        }
    }
}

unsafe fn get_hardware_adapter(factory: &IDXGIFactory4) -> Result<IDXGIAdapter1> {
    unsafe {
        for i in 0.. {
            let adapter = match factory.EnumAdapters1(i) {
                Ok(a) => a,
                Err(_) => break,
            };
            let desc = adapter.GetDesc1()?;
            if (desc.Flags & DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32) != 0 {
                continue;
            }
            if D3D12CreateDevice(
                &adapter,
                D3D_FEATURE_LEVEL_11_0,
                std::ptr::null_mut::<Option<ID3D12Device>>(),
            )
            .is_ok()
            {
                let name_len = desc.Description.iter().position(|&c| c == 0).unwrap_or(desc.Description.len());
                info!("using adapter {i}: {}", String::from_utf16_lossy(&desc.Description[..name_len]));
                return Ok(adapter);
            }
        }
        Err(anyhow!("No suitable GPU adapter found, try --warp"))
    }
}

/// Records a transition barrier without taking a COM reference on `resource`.
unsafe fn resource_barrier(
    command_list: &ID3D12GraphicsCommandList,
    resource: &ID3D12Resource,
    before: D3D12_RESOURCE_STATES,
    after: D3D12_RESOURCE_STATES,
) {
    unsafe {
        // Borrowed pointer; ManuallyDrop keeps the refcount untouched.
        let resource_view: Option<ID3D12Resource> = std::mem::transmute(resource.as_raw());
        let barriers = [D3D12_RESOURCE_BARRIER {
            Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
            Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
            Anonymous: D3D12_RESOURCE_BARRIER_0 {
                Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                    pResource: ManuallyDrop::new(resource_view),
                    StateBefore: before,
                    StateAfter: after,
                    Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
                }),
            },
        }];
        command_list.ResourceBarrier(&barriers);
    }
}

fn create_upload_buffer(device: &ID3D12Device, size: u64) -> Result<ID3D12Resource> {
    unsafe {
        let mut resource: Option<ID3D12Resource> = None;
        device.CreateCommittedResource(
            &D3D12_HEAP_PROPERTIES {
                Type: D3D12_HEAP_TYPE_UPLOAD,
                ..Default::default()
            },
            D3D12_HEAP_FLAG_NONE,
            &D3D12_RESOURCE_DESC {
                Dimension: D3D12_RESOURCE_DIMENSION_BUFFER,
                Width: size.max(1),
                Height: 1,
                DepthOrArraySize: 1,
                MipLevels: 1,
                SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
                Layout: D3D12_TEXTURE_LAYOUT_ROW_MAJOR,
                ..Default::default()
            },
            D3D12_RESOURCE_STATE_GENERIC_READ,
            None,
            &mut resource,
        )?;
        resource.ok_or_else(|| anyhow!("Failed to create upload buffer"))
    }
}

fn create_intermediate_target(device: &ID3D12Device, width: u32, height: u32) -> Result<ID3D12Resource> {
    unsafe {
        let mut texture: Option<ID3D12Resource> = None;
        device.CreateCommittedResource(
            &D3D12_HEAP_PROPERTIES {
                Type: D3D12_HEAP_TYPE_DEFAULT,
                ..Default::default()
            },
            D3D12_HEAP_FLAG_NONE,
            &D3D12_RESOURCE_DESC {
                Dimension: D3D12_RESOURCE_DIMENSION_TEXTURE2D,
                Width: width.max(1) as u64,
                Height: height.max(1),
                DepthOrArraySize: 1,
                MipLevels: 1,
                Format: INTERMEDIATE_FORMAT,
                SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
                Flags: D3D12_RESOURCE_FLAG_ALLOW_RENDER_TARGET,
                ..Default::default()
            },
            D3D12_RESOURCE_STATE_PIXEL_SHADER_RESOURCE,
            Some(&D3D12_CLEAR_VALUE {
                Format: INTERMEDIATE_FORMAT,
                Anonymous: D3D12_CLEAR_VALUE_0 {
                    Color: [0.0, 0.0, 0.0, 1.0],
                },
            }),
            &mut texture,
        )?;
        texture.ok_or_else(|| anyhow!("Failed to create intermediate render target"))
    }
}

fn create_root_signature(device: &ID3D12Device) -> Result<ID3D12RootSignature> {
    unsafe {
        // 0: ShaderConstants as root constants (b0)
        // 1: two SRVs (t0, t1)
        let ranges = [D3D12_DESCRIPTOR_RANGE {
            RangeType: D3D12_DESCRIPTOR_RANGE_TYPE_SRV,
            NumDescriptors: 2,
            BaseShaderRegister: 0,
            RegisterSpace: 0,
            OffsetInDescriptorsFromTableStart: 0,
        }];
        let parameters = [
            D3D12_ROOT_PARAMETER {
                ParameterType: D3D12_ROOT_PARAMETER_TYPE_32BIT_CONSTANTS,
                Anonymous: D3D12_ROOT_PARAMETER_0 {
                    Constants: D3D12_ROOT_CONSTANTS {
                        ShaderRegister: 0,
                        RegisterSpace: 0,
                        Num32BitValues: (std::mem::size_of::<ShaderConstants>() / 4) as u32,
                    },
                },
                ShaderVisibility: D3D12_SHADER_VISIBILITY_PIXEL,
            },
            D3D12_ROOT_PARAMETER {
                ParameterType: D3D12_ROOT_PARAMETER_TYPE_DESCRIPTOR_TABLE,
                Anonymous: D3D12_ROOT_PARAMETER_0 {
                    DescriptorTable: D3D12_ROOT_DESCRIPTOR_TABLE {
                        NumDescriptorRanges: ranges.len() as u32,
                        pDescriptorRanges: ranges.as_ptr(),
                    },
                },
                ShaderVisibility: D3D12_SHADER_VISIBILITY_PIXEL,
            },
        ];

        let sampler = D3D12_STATIC_SAMPLER_DESC {
            Filter: D3D12_FILTER_MIN_MAG_MIP_LINEAR,
            AddressU: D3D12_TEXTURE_ADDRESS_MODE_CLAMP,
            AddressV: D3D12_TEXTURE_ADDRESS_MODE_CLAMP,
            AddressW: D3D12_TEXTURE_ADDRESS_MODE_CLAMP,
            MaxLOD: D3D12_FLOAT32_MAX,
            ShaderRegister: 0,
            RegisterSpace: 0,
            ShaderVisibility: D3D12_SHADER_VISIBILITY_PIXEL,
            ..Default::default()
        };

        let desc = D3D12_ROOT_SIGNATURE_DESC {
            NumParameters: parameters.len() as u32,
            pParameters: parameters.as_ptr(),
            NumStaticSamplers: 1,
            pStaticSamplers: &sampler,
            Flags: D3D12_ROOT_SIGNATURE_FLAG_ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT,
        };

        let mut signature = None;
        let mut error = None;
        D3D12SerializeRootSignature(&desc, D3D_ROOT_SIGNATURE_VERSION_1, &mut signature, Some(&mut error))?;
        let signature = signature.ok_or_else(|| anyhow!("Failed to serialize root signature"))?;
        let root_signature = device.CreateRootSignature(
            0,
            std::slice::from_raw_parts(signature.GetBufferPointer() as *const u8, signature.GetBufferSize()),
        )?;
        Ok(root_signature)
    }
}

/// Root constants, texture bindings and output encoders shared by every pixel shader.
fn shader_prelude() -> String {
    format!(
        r#"
        cbuffer Constants : register(b0) {{
            float referenceWhiteNits;
            uint displayCurve;
            float evValue;
            uint heatmap;
        }};
        Texture2D<float4> source : register(t0);
        Texture2D<float4> lookup : register(t1);
        SamplerState linearSampler : register(s0);

        static const float HEATMAP_LOG_MIN = {log_min:.6};
        static const float HEATMAP_LOG_MAX = {log_max:.6};

        static const float3x3 REC709_TO_REC2020 = {{
            0.6274040, 0.3292820, 0.0433136,
            0.0690970, 0.9195400, 0.0113612,
            0.0163916, 0.0880132, 0.8955950
        }};

        float3 EncodeSrgb(float3 c) {{
            c = saturate(c);
            return c <= 0.0031308 ? c * 12.92 : 1.055 * pow(c, 1.0 / 2.4) - 0.055;
        }}

        float3 EncodePq(float3 normalized) {{
            const float m1 = 2610.0 / 16384.0;
            const float m2 = 2523.0 / 4096.0 * 128.0;
            const float c1 = 3424.0 / 4096.0;
            const float c2 = 2413.0 / 4096.0 * 32.0;
            const float c3 = 2392.0 / 4096.0 * 32.0;
            float3 p = pow(saturate(normalized), m1);
            return pow((c1 + c2 * p) / (1.0 + c3 * p), m2);
        }}

        float3 EncodeOutput(float3 scrgb) {{
            if (displayCurve == 1) {{
                float3 rec2020 = mul(REC709_TO_REC2020, scrgb);
                return EncodePq(rec2020 * referenceWhiteNits / 10000.0);
            }}
            if (displayCurve == 2) {{
                return scrgb * referenceWhiteNits / 80.0;
            }}
            return EncodeSrgb(scrgb);
        }}

        struct PSInput {{
            float4 position : SV_Position;
            float2 uv : TEXCOORD;
            float4 color : COLOR;
        }};
        "#,
        log_min = HEATMAP_MIN_NITS.log10(),
        log_max = HEATMAP_MAX_NITS.log10(),
    )
}

const SCENE_SOLID_PS: &str = r#"
    float4 main(PSInput input) : SV_Target {
        return float4(input.color.rgb * exp2(evValue), input.color.a);
    }
"#;

const SCENE_TEXTURED_PS: &str = r#"
    float4 main(PSInput input) : SV_Target {
        float4 texel = source.Sample(linearSampler, input.uv) * input.color;
        return float4(texel.rgb * exp2(evValue), 1.0);
    }
"#;

const UI_PS: &str = r#"
    float4 main(PSInput input) : SV_Target {
        float4 c = input.color * source.Sample(linearSampler, input.uv);
        return float4(EncodeOutput(c.rgb), c.a);
    }
"#;

const PRESENT_PS: &str = r#"
    float4 main(float4 position : SV_Position, float2 uv : TEXCOORD) : SV_Target {
        float3 scrgb = source.Load(int3(position.xy, 0)).rgb;
        if (heatmap != 0) {
            float nits = dot(scrgb, float3(0.2126, 0.7152, 0.0722)) * referenceWhiteNits;
            float t = saturate((log10(max(nits, 1e-6)) - HEATMAP_LOG_MIN) / (HEATMAP_LOG_MAX - HEATMAP_LOG_MIN));
            scrgb = lookup.SampleLevel(linearSampler, float2(t, 0.5), 0).rgb;
        }
        return float4(EncodeOutput(scrgb), 1.0);
    }
"#;

const QUAD_VS: &str = r#"
    struct VSInput {
        float2 position : POSITION;
        float2 uv : TEXCOORD;
        float4 color : COLOR;
    };
    struct VSOutput {
        float4 position : SV_Position;
        float2 uv : TEXCOORD;
        float4 color : COLOR;
    };
    VSOutput main(VSInput input) {
        VSOutput output;
        output.position = float4(input.position, 0.0, 1.0);
        output.uv = input.uv;
        output.color = input.color;
        return output;
    }
"#;

const FULLSCREEN_VS: &str = r#"
    struct VSOutput {
        float4 position : SV_Position;
        float2 uv : TEXCOORD;
    };
    VSOutput main(uint vertexId : SV_VertexID) {
        float2 positions[6] = {
            float2(-1, -1), float2(-1, 1), float2(1, 1),
            float2(-1, -1), float2(1, 1), float2(1, -1)
        };
        VSOutput output;
        output.position = float4(positions[vertexId], 0.0, 1.0);
        output.uv = positions[vertexId] * float2(0.5, -0.5) + 0.5;
        return output;
    }
"#;

fn blend_desc(enabled: bool) -> D3D12_BLEND_DESC {
    let mut desc = D3D12_BLEND_DESC::default();
    desc.RenderTarget[0] = D3D12_RENDER_TARGET_BLEND_DESC {
        BlendEnable: enabled.into(),
        SrcBlend: D3D12_BLEND_SRC_ALPHA,
        DestBlend: D3D12_BLEND_INV_SRC_ALPHA,
        BlendOp: D3D12_BLEND_OP_ADD,
        SrcBlendAlpha: D3D12_BLEND_ONE,
        DestBlendAlpha: D3D12_BLEND_INV_SRC_ALPHA,
        BlendOpAlpha: D3D12_BLEND_OP_ADD,
        RenderTargetWriteMask: D3D12_COLOR_WRITE_ENABLE_ALL.0 as u8,
        ..Default::default()
    };
    desc
}

fn pipeline_desc(
    root_signature: &ID3D12RootSignature,
    vs_blob: &ID3DBlob,
    ps_blob: &ID3DBlob,
    format: DXGI_FORMAT,
    blend: bool,
) -> D3D12_GRAPHICS_PIPELINE_STATE_DESC {
    let mut rtv_formats = [DXGI_FORMAT_UNKNOWN; 8];
    rtv_formats[0] = format;
    unsafe {
        D3D12_GRAPHICS_PIPELINE_STATE_DESC {
            pRootSignature: ManuallyDrop::new(Some(root_signature.clone())),
            VS: D3D12_SHADER_BYTECODE {
                pShaderBytecode: vs_blob.GetBufferPointer(),
                BytecodeLength: vs_blob.GetBufferSize(),
            },
            PS: D3D12_SHADER_BYTECODE {
                pShaderBytecode: ps_blob.GetBufferPointer(),
                BytecodeLength: ps_blob.GetBufferSize(),
            },
            BlendState: blend_desc(blend),
            SampleMask: u32::MAX,
            RasterizerState: D3D12_RASTERIZER_DESC {
                FillMode: D3D12_FILL_MODE_SOLID,
                CullMode: D3D12_CULL_MODE_NONE,
                ..Default::default()
            },
            PrimitiveTopologyType: D3D12_PRIMITIVE_TOPOLOGY_TYPE_TRIANGLE,
            NumRenderTargets: 1,
            RTVFormats: rtv_formats,
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            ..Default::default()
        }
    }
}

fn create_pso(device: &ID3D12Device, mut desc: D3D12_GRAPHICS_PIPELINE_STATE_DESC) -> Result<ID3D12PipelineState> {
    let pso = unsafe { device.CreateGraphicsPipelineState(&desc) };
    // Release the root signature reference the descriptor held.
    unsafe { ManuallyDrop::drop(&mut desc.pRootSignature) };
    Ok(pso?)
}

fn create_quad_pso(
    device: &ID3D12Device,
    root_signature: &ID3D12RootSignature,
    format: DXGI_FORMAT,
    ps_source: &str,
    blend: bool,
) -> Result<ID3D12PipelineState> {
    let vs_blob = compile_shader(QUAD_VS, "main", "vs_5_0")?;
    let ps_blob = compile_shader(ps_source, "main", "ps_5_0")?;

    let input_elements = [
        D3D12_INPUT_ELEMENT_DESC {
            SemanticName: PCSTR(b"POSITION\0".as_ptr()),
            SemanticIndex: 0,
            Format: DXGI_FORMAT_R32G32_FLOAT,
            InputSlot: 0,
            AlignedByteOffset: 0,
            InputSlotClass: D3D12_INPUT_CLASSIFICATION_PER_VERTEX_DATA,
            InstanceDataStepRate: 0,
        },
        D3D12_INPUT_ELEMENT_DESC {
            SemanticName: PCSTR(b"TEXCOORD\0".as_ptr()),
            SemanticIndex: 0,
            Format: DXGI_FORMAT_R32G32_FLOAT,
            InputSlot: 0,
            AlignedByteOffset: 8,
            InputSlotClass: D3D12_INPUT_CLASSIFICATION_PER_VERTEX_DATA,
            InstanceDataStepRate: 0,
        },
        D3D12_INPUT_ELEMENT_DESC {
            SemanticName: PCSTR(b"COLOR\0".as_ptr()),
            SemanticIndex: 0,
            Format: DXGI_FORMAT_R32G32B32A32_FLOAT,
            InputSlot: 0,
            AlignedByteOffset: 16,
            InputSlotClass: D3D12_INPUT_CLASSIFICATION_PER_VERTEX_DATA,
            InstanceDataStepRate: 0,
        },
    ];

    let mut desc = pipeline_desc(root_signature, &vs_blob, &ps_blob, format, blend);
    desc.InputLayout = D3D12_INPUT_LAYOUT_DESC {
        pInputElementDescs: input_elements.as_ptr(),
        NumElements: input_elements.len() as u32,
    };
    create_pso(device, desc)
}

fn create_present_pso(
    device: &ID3D12Device,
    root_signature: &ID3D12RootSignature,
    format: DXGI_FORMAT,
    prelude: &str,
) -> Result<ID3D12PipelineState> {
    let vs_blob = compile_shader(FULLSCREEN_VS, "main", "vs_5_0")?;
    let ps_blob = compile_shader(&format!("{prelude}{PRESENT_PS}"), "main", "ps_5_0")?;
    create_pso(device, pipeline_desc(root_signature, &vs_blob, &ps_blob, format, false))
}

fn compile_shader(source: &str, entry_point: &str, target: &str) -> Result<ID3DBlob> {
    unsafe {
        let entry = CString::new(entry_point)?;
        let target = CString::new(target)?;
        let mut blob = None;
        let mut error = None;

        let result = D3DCompile(
            source.as_ptr() as *const std::ffi::c_void,
            source.len(),
            None,
            None,
            None,
            PCSTR(entry.as_ptr() as *const u8),
            PCSTR(target.as_ptr() as *const u8),
            D3DCOMPILE_OPTIMIZATION_LEVEL3,
            0,
            &mut blob,
            Some(&mut error),
        );

        if let Some(error) = error {
            let message =
                std::slice::from_raw_parts(error.GetBufferPointer() as *const u8, error.GetBufferSize());
            error!("shader compilation: {}", String::from_utf8_lossy(message));
        }

        result?;
        blob.ok_or_else(|| anyhow!("Failed to compile shader"))
    }
}
