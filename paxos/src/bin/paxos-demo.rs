use structopt::StructOpt;

use paxos::tests::paxos_cluster;
use paxos::{quorum, Config};

#[derive(StructOpt, Debug)]
#[structopt(name = env!("CARGO_PKG_NAME"), version = env!("CARGO_PKG_VERSION"), about = env!("CARGO_PKG_DESCRIPTION"), author = env!("CARGO_PKG_AUTHORS"))]
struct Opt {
    /// Number of paxos peers
    #[structopt(short, long, default_value = "5")]
    peers: usize,

    /// Number of instances to agree on
    #[structopt(short, long, default_value = "10")]
    instances: i64,

    /// Drop requests and replies at random
    #[structopt(short, long)]
    unreliable: bool,

    /// Number of peers to kill before starting
    #[structopt(short, long, default_value = "0")]
    kill: usize,

    /// Ballot stride, the largest cluster size supported
    #[structopt(long, default_value = "10000")]
    stride: i64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    if opt.peers == 0 {
        return Err("--peers must be positive".into());
    }
    if opt.kill >= opt.peers || !quorum::is_majority(opt.peers - opt.kill, opt.peers) {
        return Err(format!("killing {} of {} peers leaves no majority", opt.kill, opt.peers).into());
    }

    let config = Config {
        stride: opt.stride,
        ..Config::default()
    };
    let cluster = paxos_cluster(opt.peers, config);
    cluster.net.set_reliable(!opt.unreliable);
    for i in opt.peers - opt.kill..opt.peers {
        cluster.kill(i);
    }

    let live = opt.peers - opt.kill;
    for seq in 0..opt.instances {
        let i = seq as usize % live;
        cluster.peers[i].start(seq, format!("value-{}-from-{}", seq, i));
    }
    for seq in 0..opt.instances {
        let v = cluster.wait_majority(seq).await;
        println!(
            "seq {}: {} of {} peers decided {:?}",
            seq,
            cluster.ndecided(seq),
            opt.peers,
            v
        );
    }

    for px in cluster.peers.iter().take(live) {
        px.done(opt.instances - 1);
    }
    for px in cluster.peers.iter().take(live) {
        println!(
            "peer {}: max {} min {} retained {}",
            px.me(),
            px.max(),
            px.min(),
            px.retained()
        );
    }
    println!("{} rpcs delivered", cluster.net.total_rpc_count());
    Ok(())
}
