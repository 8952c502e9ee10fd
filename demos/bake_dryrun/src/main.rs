use anyhow::Result;
use ash::vk;
use rmg_bake::{
    Access, BufDesc, DryRunBackend, ImgDesc, LifetimeClass, QueueClass, Rmg,
    declare::{BufferKey, ImageKey, PassKey},
};

///Deferred frame: shadow map and light culling run on compute while the gbuffer is filled, then everything is
/// resolved into the swapchain image on graphics.
struct Frame {
    passes: Vec<PassKey>,
}

fn declare_frame(rmg: &mut Rmg<DryRunBackend>) -> Result<Frame> {
    let decl = rmg.declare();
    decl.set_render_extent(1920, 1080, vk::Format::B8G8R8A8_SRGB);

    let meshes: BufferKey = decl.buffer(
        "meshes",
        BufDesc::storage(64 << 20),
        LifetimeClass::Persistent,
    );
    let lights: BufferKey = decl.buffer("lights", BufDesc::storage(1 << 16), LifetimeClass::Transient);
    let tiles: BufferKey = decl.buffer("light tiles", BufDesc::storage(8 << 20), LifetimeClass::Transient);
    let shadow: ImageKey = decl.image(
        "shadow",
        ImgDesc::texture_2d(2048, 2048, vk::Format::R32_SFLOAT),
        LifetimeClass::Transient,
    )?;
    let gbuffer = decl.image(
        "gbuffer",
        ImgDesc::render_target(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED),
        LifetimeClass::Transient,
    )?;
    let bloom = decl.image(
        "bloom",
        ImgDesc::render_target(vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED),
        LifetimeClass::Transient,
    )?;
    let swapchain = decl.image(
        "swapchain",
        ImgDesc::render_target(vk::ImageUsageFlags::COLOR_ATTACHMENT),
        LifetimeClass::Transient,
    )?;

    let upload = decl.pass("upload lights", QueueClass::Copy);
    let lights = decl.write(upload, lights, 0, Access::transfer_write())?;

    let shadow_pass = decl.pass("shadow", QueueClass::Compute);
    decl.read(shadow_pass, meshes, 0, Access::compute_read())?;
    let shadow = decl.write(shadow_pass, shadow, 1, Access::compute_write())?;

    let cull = decl.pass("cull lights", QueueClass::Compute);
    decl.read(cull, lights, 0, Access::compute_read())?;
    let tiles = decl.write(cull, tiles, 1, Access::compute_write())?;

    let geometry = decl.pass("gbuffer", QueueClass::Graphics);
    decl.read(geometry, meshes, 0, Access::vertex_read())?;
    let gbuffer = decl.write(geometry, gbuffer, 1, Access::color_attachment())?;

    let shade = decl.pass("shade", QueueClass::Graphics);
    decl.read(shade, gbuffer, 0, Access::sampled())?;
    decl.read(shade, shadow, 1, Access::sampled())?;
    decl.read(shade, tiles, 2, Access::fragment_read())?;
    let swapchain = decl.write(shade, swapchain, 3, Access::color_attachment())?;

    let bloom_pass = decl.pass("bloom", QueueClass::Compute);
    decl.read(bloom_pass, swapchain, 0, Access::sampled())?;
    let bloom = decl.write(bloom_pass, bloom, 1, Access::compute_write())?;

    let composite = decl.pass("composite", QueueClass::Graphics);
    decl.read(composite, bloom, 0, Access::sampled())?;
    let swapchain = decl.write(composite, swapchain, 1, Access::color_attachment())?;
    decl.set_present_image(swapchain)?;

    Ok(Frame {
        passes: vec![upload, shadow_pass, cull, geometry, shade, bloom_pass, composite],
    })
}

fn main() -> Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()?;

    let mut rmg = Rmg::new(DryRunBackend::new());
    let frame = declare_frame(&mut rmg)?;

    for _ in 0..3 {
        rmg.run()?;
    }

    if let Some(bake) = rmg.baked() {
        println!("{:#?}", bake.stats());
        for pass in bake.graph.passes_in_order() {
            let waits = pass
                .waits
                .iter()
                .map(|w| w.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            println!(
                "{:>3} {:<9} #{:<2} L{} {:<14} waits [{}]",
                pass.position, pass.queue, pass.queue_index, pass.level, pass.name, waits
            );
        }
        for bucket in &bake.graph.buckets {
            println!(
                "bucket {}: {} bytes, {} members{}",
                bucket.id,
                bucket.desc.byte_size(),
                bucket.member_count,
                if bucket.persistent { ", dedicated" } else { "" }
            );
        }

        #[cfg(feature = "dot")]
        println!("{}", rmg_bake::dot::to_dot(bake));
    }

    for pass in &frame.passes {
        if let (Some(name), Some(time)) = (rmg.declaration().pass_name(*pass), rmg.pass_time(*pass)) {
            log::info!("{}: {:?}", name, time);
        }
    }
    log::info!("Simulated frame time: {:?}", rmg.backend().frame_time());

    Ok(())
}
