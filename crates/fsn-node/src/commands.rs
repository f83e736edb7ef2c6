use std::io::{Read, Write};
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use fsn_engine::{EngineError, StorageEngine};
use fsn_object::{AccessIdentifiers, Assembler, LocalTarget, ObjectTarget, PayloadSizeLimiter};
use fsn_placement::{LocalInfo, Netmap, NetmapPlacementBuilder, StaticNetmap};
use fsn_policer::{ChannelReplicator, Policer, PolicerDeps};
use fsn_service::{CancelToken, InProcessClient};
use fsn_types::{Address, ContainerId, Header, OwnerId, PayloadRange, SearchFilters};
use tracing::debug;

use crate::cli::*;
use crate::config::NodeConfig;

const READ_CHUNK: usize = 64 * 1024;

pub async fn run_command(command: Command, config: &NodeConfig) -> anyhow::Result<()> {
    let engine = Arc::new(StorageEngine::open(&config.storage).context("opening storage engine")?);
    debug!(shards = engine.shard_ids().len(), "storage engine opened");
    let result = match command {
        Command::Put(args) => cmd_put(&engine, config, args).await,
        Command::Get(args) => cmd_get(&engine, args),
        Command::Head(args) => cmd_head(&engine, args),
        Command::Delete(args) => cmd_delete(&engine, args),
        Command::Select(args) => cmd_select(&engine, args),
        Command::List(args) => cmd_list(&engine, args),
        Command::Containers => cmd_containers(&engine),
        Command::Shards => cmd_shards(&engine),
        Command::Gc => cmd_gc(&engine),
        Command::Police => cmd_police(&engine, config).await,
    };
    engine.close()?;
    result
}

/// Stream `reader` through the size limiter into the local engine.
pub async fn put_stream(
    engine: &Arc<StorageEngine>,
    config: &NodeConfig,
    header: Header,
    mut reader: impl Read,
) -> anyhow::Result<AccessIdentifiers> {
    let mut target = PayloadSizeLimiter::with_config(LocalTarget::new(engine.clone()), &config.object, 0);
    target.write_header(header)?;
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        target.write_chunk(&buf[..n]).await?;
    }
    Ok(target.close().await?)
}

fn parse_pair(s: &str) -> anyhow::Result<(&str, &str)> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => bail!("expected KEY=VALUE, got {s:?}"),
    }
}

fn parse_range(s: &str) -> anyhow::Result<PayloadRange> {
    let (offset, length) = s.split_once(':').context("expected OFFSET:LENGTH")?;
    Ok(PayloadRange::new(
        offset.parse().context("bad range offset")?,
        length.parse().context("bad range length")?,
    ))
}

fn parse_address(s: &str) -> anyhow::Result<Address> {
    s.parse().with_context(|| format!("bad address {s:?}"))
}

async fn cmd_put(engine: &Arc<StorageEngine>, config: &NodeConfig, args: PutArgs) -> anyhow::Result<()> {
    let cid: ContainerId = args.container.parse().context("bad container id")?;
    let owner = match &args.owner {
        Some(owner) => owner.parse::<OwnerId>().context("bad owner id")?,
        None => OwnerId::null(),
    };
    let mut header = Header::new(cid, owner);
    for attr in &args.attributes {
        let (key, value) = parse_pair(attr)?;
        header = header.with_attribute(key, value);
    }
    let file = std::fs::File::open(&args.file).with_context(|| format!("opening {}", args.file.display()))?;

    let ids = put_stream(engine, config, header, file).await?;
    match ids.parent_id {
        Some(parent) => {
            println!("{} Stored split object {}", "✓".green().bold(), Address::new(cid, parent).to_string().yellow());
            println!("  link: {}", ids.self_id);
        }
        None => println!("{} Stored {}", "✓".green().bold(), Address::new(cid, ids.self_id).to_string().yellow()),
    }
    if config.storage.shards.iter().all(|s| s.path.is_none()) {
        println!("  {}", "storage is in memory, the object is gone on exit".dimmed());
    }
    Ok(())
}

fn cmd_get(engine: &Arc<StorageEngine>, args: GetArgs) -> anyhow::Result<()> {
    let address = parse_address(&args.address)?;
    let assembler = Assembler::new(engine.clone());
    let payload = match &args.range {
        Some(range) => assembler.assemble_range(&address, parse_range(range)?)?,
        None => assembler.assemble(&address)?.payload,
    };
    match &args.output {
        Some(path) => {
            std::fs::write(path, &payload).with_context(|| format!("writing {}", path.display()))?;
            println!("{} {} bytes written to {}", "✓".green().bold(), payload.len(), path.display());
        }
        None => std::io::stdout().write_all(&payload)?,
    }
    Ok(())
}

fn print_header(address: &Address, header: &Header) {
    println!("{}", address.to_string().yellow().bold());
    println!("  type:     {}", header.object_type);
    println!("  owner:    {}", header.owner_id);
    println!("  epoch:    {}", header.creation_epoch);
    println!("  size:     {}", header.payload_length);
    if let Some(sum) = &header.payload_checksum {
        println!("  sha256:   {}", hex::encode(&sum.sum));
    }
    if let Some(sum) = &header.payload_homomorphic_hash {
        println!("  tz:       {}", hex::encode(&sum.sum));
    }
    for attr in &header.attributes {
        println!("  {} = {}", attr.key.cyan(), attr.value);
    }
    if let Some(split) = &header.split {
        if let Some(id) = &split.split_id {
            println!("  split id: {id}");
        }
        if let Some(parent) = split.parent {
            println!("  parent:   {parent}");
        }
        if let Some(previous) = split.previous {
            println!("  previous: {previous}");
        }
        if !split.children.is_empty() {
            println!("  children: {}", split.children.len());
        }
    }
}

fn cmd_head(engine: &Arc<StorageEngine>, args: HeadArgs) -> anyhow::Result<()> {
    let address = parse_address(&args.address)?;
    match engine.head(&address, args.raw) {
        Ok(header) => print_header(&address, &header),
        Err(EngineError::SplitInfo(info)) => {
            println!("{} is a split object", address.to_string().yellow().bold());
            if let Some(id) = &info.split_id {
                println!("  split id:  {id}");
            }
            if let Some(last) = info.last_part {
                println!("  last part: {last}");
            }
            if let Some(link) = info.link {
                println!("  link:      {link}");
            }
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn cmd_delete(engine: &Arc<StorageEngine>, args: AddressArgs) -> anyhow::Result<()> {
    let address = parse_address(&args.address)?;
    engine.delete(&address)?;
    println!("{} Inhumed {}", "✓".green().bold(), address);
    Ok(())
}

fn cmd_select(engine: &Arc<StorageEngine>, args: SelectArgs) -> anyhow::Result<()> {
    let cid: ContainerId = args.container.parse().context("bad container id")?;
    let mut filters = SearchFilters::new();
    for attr in &args.attributes {
        let (key, value) = parse_pair(attr)?;
        filters = filters.add_attribute(key, value);
    }
    if args.root {
        filters = filters.add_root();
    }
    if args.phy {
        filters = filters.add_physical();
    }
    let found = engine.select(&cid, &filters)?;
    for address in &found {
        println!("{}", address.object());
    }
    println!("{} objects", found.len().to_string().bold());
    Ok(())
}

fn cmd_list(engine: &Arc<StorageEngine>, args: ListArgs) -> anyhow::Result<()> {
    for address in engine.list(args.limit)? {
        println!("{address}");
    }
    Ok(())
}

fn cmd_containers(engine: &Arc<StorageEngine>) -> anyhow::Result<()> {
    for cid in engine.list_containers()? {
        println!("{}  {} bytes", cid.to_string().yellow(), engine.container_size(&cid)?);
    }
    Ok(())
}

fn cmd_shards(engine: &Arc<StorageEngine>) -> anyhow::Result<()> {
    for info in engine.shard_info()? {
        let location = info
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "memory".into());
        println!("{}  weight {}", info.id.to_string().yellow().bold(), info.weight);
        println!("  location:   {location}");
        println!("  objects:    {} ({} cached)", info.objects, info.cached_objects);
        println!("  containers: {}", info.containers);
    }
    Ok(())
}

fn cmd_gc(engine: &Arc<StorageEngine>) -> anyhow::Result<()> {
    let removed = engine.collect_garbage()?;
    println!("{} GC: {} objects removed.", "✓".green(), removed);
    Ok(())
}

/// One policer pass where the network map holds only this node, so
/// shortages show which objects lack peers to replicate to.
async fn cmd_police(engine: &Arc<StorageEngine>, config: &NodeConfig) -> anyhow::Result<()> {
    let local = config.local_node()?;
    let netmap = StaticNetmap::new(Netmap {
        epoch: 0,
        nodes: vec![local.clone()],
    });
    let (replicator, mut tasks) = ChannelReplicator::new(1024);
    let deps = PolicerDeps {
        objects: engine.clone(),
        inhumer: engine.clone(),
        containers: Arc::new(config.container_source()?),
        builder: Arc::new(NetmapPlacementBuilder::new(Arc::new(netmap))),
        client: Arc::new(InProcessClient::new()),
        replicator: Arc::new(replicator),
        local: LocalInfo::new(local),
        on_redundant: Some(Arc::new(|address: Address| {
            println!("  {} {}", "redundant".yellow(), address);
        })),
    };
    let policer = Policer::new(config.policer.clone(), deps);
    let report = policer.run_pass(&CancelToken::never()).await;

    while let Ok(task) = tasks.try_recv() {
        println!("  {} {} needs {} more", "replicate".red(), task.address, task.quantity);
    }
    println!(
        "{} {} checked, {} under-replicated, {} redundant, {} inhumed, {} failed",
        "✓".green(),
        report.processed,
        report.replication_tasks,
        report.redundant,
        report.inhumed,
        report.failed,
    );
    Ok(())
}
