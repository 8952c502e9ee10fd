use ash::vk;
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    Access, Backend, Bake, BakeError, BakeOptions, BufDesc, Declaration, DryRunBackend, GraphError, ImageExtent,
    ImgDesc, LifetimeClass, QueueClass, ResKey, SyncEntry, bake,
};

fn bake_decl(decl: &Declaration) -> Result<Bake, BakeError> {
    bake(&decl.encode().unwrap().bytes, &BakeOptions::default())
}

#[test]
fn compute_result_is_awaited_by_graphics() {
    let mut decl = Declaration::new();
    let lights = decl.buffer("lights", BufDesc::storage(4096), LifetimeClass::Transient);
    let cull = decl.pass("cull", QueueClass::Compute);
    let lights = decl.write(cull, lights, 0, Access::compute_write()).unwrap();
    let shade = decl.pass("shade", QueueClass::Graphics);
    decl.read(shade, lights, 0, Access::fragment_read()).unwrap();

    let bake = bake_decl(&decl).unwrap();
    assert!(bake.dependencies.edges().iter().any(|e| e.producer == 0 && e.consumer == 1));
    let shade = bake.graph.pass(bake.registry.passes()[1].id).unwrap();
    assert!(shade.waits.contains(&SyncEntry {
        queue: QueueClass::Compute,
        index: 0
    }));
}

#[test]
fn bindless_reads_order_across_queues() {
    let mut decl = Declaration::new();
    let data = decl.buffer("data", BufDesc::storage(4096), LifetimeClass::Transient);
    let noise = decl.buffer("noise", BufDesc::storage(256), LifetimeClass::Transient);
    let produce = decl.pass("produce", QueueClass::Compute);
    let data1 = decl.write(produce, data, 0, Access::compute_write()).unwrap();
    let table = decl.bindless("table", &[data1.into(), noise.into()]).unwrap();
    let consume = decl.pass("consume", QueueClass::Graphics);
    decl.use_bindless(consume, table).unwrap();

    let encoded = decl.encode().unwrap();
    let bake = bake(&encoded.bytes, &BakeOptions::default()).unwrap();
    assert!(bake.dependencies.edges().iter().any(|e| e.producer == 0 && e.consumer == 1));
    assert!(bake.sync.waits(1).contains(&SyncEntry {
        queue: QueueClass::Compute,
        index: 0
    }));

    let consumed_at = bake.schedule.position(1).unwrap();
    let data1 = encoded.ids.res(data1.into()).unwrap();
    assert_eq!(bake.aliasing.liveness(data1).map(|l| l.last), Some(consumed_at));

    //only reachable through the table
    let noise = encoded.ids.res(noise.into()).unwrap();
    let live = bake.aliasing.liveness(noise).unwrap();
    assert_eq!((live.first, live.last), (consumed_at, consumed_at));
    assert!(bake.aliasing.bucket_of(noise).is_some());
    assert!(!bake.aliasing.unused().contains(&noise));
}

#[test]
fn huge_images_saturate_statistics() {
    let mut decl = Declaration::new();
    let mut desc = ImgDesc::texture_2d(u32::MAX, u32::MAX, vk::Format::R32G32B32A32_SFLOAT);
    desc.extent = ImageExtent::Fixed {
        width: u32::MAX,
        height: u32::MAX,
        depth: 4,
    };
    let volume = decl.image("volume", desc, LifetimeClass::Transient).unwrap();
    let fill = decl.pass("fill", QueueClass::Compute);
    decl.write(fill, volume, 0, Access::compute_write()).unwrap();

    let bake = bake_decl(&decl).unwrap();
    assert!(bake.aliasing.buckets().iter().any(|b| b.desc.byte_size() == u64::MAX));
    assert_eq!(bake.stats().bytes, u64::MAX);
}

#[test]
fn disjoint_resources_are_packed() {
    let mut decl = Declaration::new();
    let x = decl.buffer("x", BufDesc::storage(1024), LifetimeClass::Transient);
    let tmp = decl.buffer("tmp", BufDesc::storage(1024), LifetimeClass::Transient);
    let y = decl.buffer("y", BufDesc::storage(1024), LifetimeClass::Transient);

    let a = decl.pass("a", QueueClass::Compute);
    let x1 = decl.write(a, x, 0, Access::compute_write()).unwrap();
    let b = decl.pass("b", QueueClass::Compute);
    decl.read(b, x1, 0, Access::compute_read()).unwrap();
    let tmp1 = decl.write(b, tmp, 1, Access::compute_write()).unwrap();
    let c = decl.pass("c", QueueClass::Compute);
    decl.read(c, tmp1, 0, Access::compute_read()).unwrap();
    let y1 = decl.write(c, y, 1, Access::compute_write()).unwrap();
    let d = decl.pass("d", QueueClass::Compute);
    decl.read(d, y1, 0, Access::compute_read()).unwrap();

    let encoded = decl.encode().unwrap();
    let bake = bake(&encoded.bytes, &BakeOptions::default()).unwrap();
    let x = encoded.ids.res(x.into()).unwrap();
    let y = encoded.ids.res(y.into()).unwrap();
    let tmp = encoded.ids.res(tmp.into()).unwrap();
    assert_eq!(bake.graph.bucket_of(x), bake.graph.bucket_of(y));
    assert_ne!(bake.graph.bucket_of(x), bake.graph.bucket_of(tmp));
    assert_eq!(bake.stats().buckets, 2);
}

#[test]
fn render_target_format_is_derived() {
    let mut decl = Declaration::new();
    let mut desc = ImgDesc::render_target(vk::ImageUsageFlags::COLOR_ATTACHMENT);
    desc.format = vk::Format::R8G8B8A8_UNORM;
    assert!(decl.image("gbuffer", desc, LifetimeClass::Transient).is_err());
}

#[test]
fn diamond_joins_after_both_branches() {
    let mut decl = Declaration::new();
    let x = decl.buffer("x", BufDesc::storage(64), LifetimeClass::Transient);
    let y = decl.buffer("y", BufDesc::storage(64), LifetimeClass::Transient);
    let z = decl.buffer("z", BufDesc::storage(64), LifetimeClass::Transient);

    let a = decl.pass("a", QueueClass::Graphics);
    let x1 = decl.write(a, x, 0, Access::compute_write()).unwrap();
    let b = decl.pass("b", QueueClass::Compute);
    decl.read(b, x1, 0, Access::compute_read()).unwrap();
    let y1 = decl.write(b, y, 1, Access::compute_write()).unwrap();
    let c = decl.pass("c", QueueClass::Graphics);
    decl.read(c, x1, 0, Access::compute_read()).unwrap();
    let z1 = decl.write(c, z, 1, Access::compute_write()).unwrap();
    let d = decl.pass("d", QueueClass::Graphics);
    decl.read(d, y1, 0, Access::fragment_read()).unwrap();
    decl.read(d, z1, 1, Access::fragment_read()).unwrap();

    let bake = bake_decl(&decl).unwrap();
    let position = |idx: usize| bake.schedule.position(idx).unwrap();
    assert!(position(3) > position(1));
    assert!(position(3) > position(2));
    assert_eq!(bake.schedule.level(3), 2);
}

#[test]
fn mutual_dependency_is_cyclic() {
    let mut decl = Declaration::new();
    let x = decl.buffer("x", BufDesc::storage(64), LifetimeClass::Transient);
    let y = decl.buffer("y", BufDesc::storage(64), LifetimeClass::Transient);

    let a = decl.pass("a", QueueClass::Compute);
    let x1 = decl.write(a, x, 0, Access::compute_write()).unwrap();
    let b = decl.pass("b", QueueClass::Compute);
    decl.read(b, x1, 0, Access::compute_read()).unwrap();
    let y1 = decl.write(b, y, 1, Access::compute_write()).unwrap();
    decl.read(a, y1, 1, Access::compute_read()).unwrap();

    assert!(matches!(
        bake_decl(&decl),
        Err(BakeError::Graph(GraphError::CyclicDependency { .. }))
    ));
}

#[test]
fn persistent_resources_keep_their_memory() {
    let mut decl = Declaration::new();
    let history = decl.buffer("history", BufDesc::storage(512), LifetimeClass::Persistent);
    let scratch = decl.buffer("scratch", BufDesc::storage(512), LifetimeClass::Transient);

    let a = decl.pass("accumulate", QueueClass::Compute);
    let history1 = decl.write(a, history, 0, Access::compute_write()).unwrap();
    let b = decl.pass("resolve", QueueClass::Compute);
    decl.read(b, history1, 0, Access::compute_read()).unwrap();
    let scratch1 = decl.write(b, scratch, 1, Access::compute_write()).unwrap();
    let c = decl.pass("consume", QueueClass::Compute);
    decl.read(c, scratch1, 0, Access::compute_read()).unwrap();

    let bake = bake_decl(&decl).unwrap();
    for bucket in bake.aliasing.buckets().iter().filter(|b| b.persistent) {
        for member in &bucket.members {
            assert_eq!(bake.registry.base_of(member.resource), bucket.base);
        }
    }
    assert!(bake.aliasing.buckets().iter().any(|b| b.persistent));
}

#[test]
fn unchanged_declaration_bakes_identically() {
    let mut decl = Declaration::new();
    let data = decl.buffer("data", BufDesc::storage(64), LifetimeClass::Transient);
    let other = decl.buffer("other", BufDesc::storage(64), LifetimeClass::Transient);
    let p0 = decl.pass("p0", QueueClass::Compute);
    let data = decl.write(p0, data, 0, Access::compute_write()).unwrap();
    let p1 = decl.pass("p1", QueueClass::Copy);
    decl.read(p1, data, 0, Access::transfer_read()).unwrap();
    decl.write(p1, other, 1, Access::transfer_write()).unwrap();
    let p2 = decl.pass("p2", QueueClass::Graphics);
    decl.read(p2, data, 0, Access::vertex_read()).unwrap();

    let first = bake_decl(&decl).unwrap();
    let second = bake_decl(&decl).unwrap();
    assert_eq!(first.graph, second.graph);
    assert_eq!(first.graph.encode(), second.graph.encode());
    assert_eq!(first.stats(), second.stats());
}

///Declares `passes` passes on random queues. Each pass reads and overwrites random current versions of `resources`
/// buffers, so the graph is acyclic in declaration order.
fn random_declaration(rng: &mut StdRng, resources: usize, passes: usize) -> Declaration {
    let mut decl = Declaration::new();
    let mut current: Vec<ResKey> = (0..resources)
        .map(|i| {
            let lifetime = if rng.gen_bool(0.2) {
                LifetimeClass::Persistent
            } else {
                LifetimeClass::Transient
            };
            let size = 64 << rng.gen_range(0..3);
            decl.buffer(&format!("r{}", i), BufDesc::storage(size), lifetime).into()
        })
        .collect();

    for p in 0..passes {
        let queue = QueueClass::ALL[rng.gen_range(0..QueueClass::COUNT)];
        let pass = decl.pass(&format!("p{}", p), queue);
        let mut binding = 0;
        let mut touched = Vec::new();
        for _ in 0..rng.gen_range(0..3) {
            let r = rng.gen_range(0..resources);
            if touched.contains(&r) {
                continue;
            }
            touched.push(r);
            decl.read(pass, current[r], binding, Access::compute_read()).unwrap();
            binding += 1;
        }
        for _ in 0..rng.gen_range(0..3) {
            let r = rng.gen_range(0..resources);
            if touched.contains(&r) {
                continue;
            }
            touched.push(r);
            current[r] = decl.write(pass, current[r], binding, Access::compute_write()).unwrap();
            binding += 1;
        }
    }
    decl
}

#[test]
fn random_graphs_hold_schedule_invariants() {
    let mut rng = StdRng::seed_from_u64(0x5eed_cafe);
    for _ in 0..64 {
        let resources = rng.gen_range(1..8);
        let passes = rng.gen_range(1..24);
        let decl = random_declaration(&mut rng, resources, passes);
        let bake = bake_decl(&decl).unwrap();

        for edge in bake.dependencies.edges() {
            assert!(bake.schedule.position(edge.producer) < bake.schedule.position(edge.consumer));
        }

        for bucket in bake.aliasing.buckets() {
            for pair in bucket.members.windows(2) {
                let (a, b) = (pair[0].resource, pair[1].resource);
                if bake.registry.base_of(a) == bake.registry.base_of(b) {
                    assert!(bake.registry.chain_order(a) <= bake.registry.chain_order(b));
                }
            }
            for (i, a) in bucket.members.iter().enumerate() {
                for b in &bucket.members[i + 1..] {
                    if bake.registry.base_of(a.resource) == bake.registry.base_of(b.resource) {
                        continue;
                    }
                    if let (Some(la), Some(lb)) = (a.liveness, b.liveness) {
                        assert!(la.independent(&lb), "{} and {} overlap", a.resource, b.resource);
                    }
                }
                if bucket.persistent {
                    assert_eq!(bake.registry.base_of(a.resource), bucket.base);
                }
            }
        }

        for res in bake.registry.resources() {
            if let Some(live) = bake.aliasing.liveness(res) {
                assert!(live.first <= live.last);
            }
        }
    }
}

#[test]
fn random_graphs_run_without_deadlock() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..64 {
        let resources = rng.gen_range(1..6);
        let passes = rng.gen_range(1..20);
        let decl = random_declaration(&mut rng, resources, passes);
        let bake = bake_decl(&decl).unwrap();

        let mut backend = DryRunBackend::new();
        backend.create(&bake.graph.encode()).unwrap();
        backend.bake(&bake.graph).unwrap();
        backend.submit().unwrap();

        let executed = backend.executed();
        assert_eq!(executed.len(), passes);
        let slot = |idx: usize| {
            let id = bake.registry.passes()[idx].id;
            executed.iter().position(|p| *p == id).unwrap()
        };
        for edge in bake.dependencies.edges() {
            assert!(slot(edge.producer) < slot(edge.consumer));
        }
    }
}
