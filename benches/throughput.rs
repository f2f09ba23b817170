use redis::Commands;
use std::sync::Arc;
use std::time::Instant;
use zedis::config::Config;
use zedis::engine::Engine;

fn start_server(port: u16) -> tokio::task::JoinHandle<()> {
    let engine = Arc::new(Engine::new(Config { port, ..Default::default() }));
    tokio::spawn(async move {
        let _ = zedis::server::run_server(engine).await;
    })
}

fn get_client(port: u16) -> redis::Connection {
    let client = redis::Client::open(format!("redis://127.0.0.1:{port}/")).unwrap();
    for i in 0..50 {
        match client.get_connection() {
            Ok(conn) => return conn,
            Err(_) if i < 49 => std::thread::sleep(std::time::Duration::from_millis(100)),
            Err(e) => panic!("Failed to connect: {e}"),
        }
    }
    unreachable!()
}

fn ops_per_sec(iterations: usize, start: Instant) -> f64 {
    iterations as f64 / start.elapsed().as_secs_f64()
}

fn bench_set_get(conn: &mut redis::Connection, iterations: usize) -> (f64, f64) {
    let start = Instant::now();
    for i in 0..iterations {
        let _: () = conn.set(format!("bench:{i}"), i).unwrap();
    }
    let set_ops = ops_per_sec(iterations, start);

    let start = Instant::now();
    for i in 0..iterations {
        let _: i64 = conn.get(format!("bench:{i}")).unwrap();
    }
    (set_ops, ops_per_sec(iterations, start))
}

/// MULTI/EXEC batches of ten INCRs across different keys.
fn bench_exec(conn: &mut redis::Connection, iterations: usize) -> f64 {
    let start = Instant::now();
    for _ in 0..iterations / 10 {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for k in 0..10 {
            pipe.incr(format!("counter:{k}"), 1).ignore();
        }
        let _: () = pipe.query(conn).unwrap();
    }
    ops_per_sec(iterations, start)
}

fn bench_pfadd(conn: &mut redis::Connection, iterations: usize) -> f64 {
    let start = Instant::now();
    for i in 0..iterations {
        let _: i64 = redis::cmd("PFADD").arg("bench:hll").arg(i).query(conn).unwrap();
    }
    ops_per_sec(iterations, start)
}

fn bench_publish(conn: &mut redis::Connection, iterations: usize) -> f64 {
    let start = Instant::now();
    for i in 0..iterations {
        let _: i64 = conn.publish("bench:channel", i).unwrap();
    }
    ops_per_sec(iterations, start)
}

/// In-process executor throughput with several tasks on disjoint keys.
async fn bench_engine(tasks: usize, iterations: usize) -> f64 {
    let engine = Arc::new(Engine::new(Config::default()));
    let start = Instant::now();
    let handles: Vec<_> = (0..tasks)
        .map(|t| {
            let engine = engine.clone();
            tokio::spawn(async move {
                for i in 0..iterations {
                    let key = format!("task{t}:{}", i % 64);
                    engine.execute(&["INCR", key.as_str()]).await;
                }
            })
        })
        .collect();
    for h in handles {
        h.await.unwrap();
    }
    ops_per_sec(tasks * iterations, start)
}

#[tokio::main]
async fn main() {
    let port = 17500;
    let _server = start_server(port);
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let iterations = 10_000;
    tokio::task::spawn_blocking(move || {
        let mut conn = get_client(port);
        println!("=== Zedis benchmark ({iterations} operations) ===\n");

        let (set_ops, get_ops) = bench_set_get(&mut conn, iterations);
        println!("SET:      {set_ops:>10.0} ops/sec");
        println!("GET:      {get_ops:>10.0} ops/sec");

        let exec_ops = bench_exec(&mut conn, iterations);
        println!("EXEC:     {exec_ops:>10.0} ops/sec (10-command transactions)");

        let pfadd_ops = bench_pfadd(&mut conn, iterations);
        println!("PFADD:    {pfadd_ops:>10.0} ops/sec");

        let publish_ops = bench_publish(&mut conn, iterations);
        println!("PUBLISH:  {publish_ops:>10.0} ops/sec (no subscribers)");
    })
    .await
    .unwrap();

    let engine_ops = bench_engine(8, iterations).await;
    println!("ENGINE:   {engine_ops:>10.0} ops/sec (8 tasks, in-process INCR)");
    println!("\n=== Done ===");
}
