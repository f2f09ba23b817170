use redis::Commands;
use std::sync::Arc;
use std::time::Duration;

fn start_server(port: u16) -> tokio::task::JoinHandle<()> {
    let config = zedis::config::Config {
        port,
        hz: 50,
        ..Default::default()
    };
    let engine = Arc::new(zedis::engine::Engine::new(config));
    tokio::spawn(async move {
        let _ = zedis::server::run_server(engine).await;
    })
}

fn get_client(port: u16) -> redis::Connection {
    let client = redis::Client::open(format!("redis://127.0.0.1:{port}/")).unwrap();
    for i in 0..50 {
        match client.get_connection() {
            Ok(conn) => return conn,
            Err(_) if i < 49 => {
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(e) => panic!("Failed to connect: {e}"),
        }
    }
    unreachable!()
}

/// Start a server on `port` and run `body` against a blocking client.
async fn with_server<F>(port: u16, body: F)
where
    F: FnOnce(redis::Connection) + Send + 'static,
{
    let _server = start_server(port);
    tokio::time::sleep(Duration::from_millis(200)).await;
    tokio::task::spawn_blocking(move || body(get_client(port))).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ping_echo() {
    with_server(17379, |mut conn| {
        let pong: String = redis::cmd("PING").query(&mut conn).unwrap();
        assert_eq!(pong, "PONG");
        let echoed: String = redis::cmd("ECHO").arg("hello world").query(&mut conn).unwrap();
        assert_eq!(echoed, "hello world");
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_set_get_and_counter() {
    with_server(17380, |mut conn| {
        let _: () = conn.set("mykey", "myvalue").unwrap();
        let val: String = conn.get("mykey").unwrap();
        assert_eq!(val, "myvalue");
        let missing: Option<String> = conn.get("never-written").unwrap();
        assert_eq!(missing, None);

        let _: () = conn.set("counter", 0).unwrap();
        for _ in 0..25 {
            let _: i64 = conn.incr("counter", 1).unwrap();
        }
        let val: i64 = conn.get("counter").unwrap();
        assert_eq!(val, 25);

        let _: () = conn.set("word", "abc").unwrap();
        let err = conn.incr::<_, _, i64>("word", 1).unwrap_err();
        assert!(err.to_string().contains("not an integer"));
        let val: String = conn.get("word").unwrap();
        assert_eq!(val, "abc");
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ttl_expires_without_reaper_help() {
    with_server(17381, |mut conn| {
        let _: () = redis::cmd("SET").arg("session").arg("token").arg("PX").arg(150).query(&mut conn).unwrap();
        let ttl: i64 = conn.pttl("session").unwrap();
        assert!(ttl > 0 && ttl <= 150);
        let val: Option<String> = conn.get("session").unwrap();
        assert_eq!(val.as_deref(), Some("token"));

        std::thread::sleep(Duration::from_millis(250));
        let val: Option<String> = conn.get("session").unwrap();
        assert_eq!(val, None);
        let ttl: i64 = conn.ttl("session").unwrap();
        assert_eq!(ttl, -2);

        let _: () = conn.set("plain", "v").unwrap();
        let ttl: i64 = conn.ttl("plain").unwrap();
        assert_eq!(ttl, -1);
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reaper_reclaims_untouched_keys() {
    with_server(17382, |mut conn| {
        for i in 0..50 {
            let _: () = redis::cmd("SET").arg(format!("tmp:{i}")).arg(i).arg("PX").arg(50).query(&mut conn).unwrap();
        }
        let _: () = conn.set("keeper", "v").unwrap();
        std::thread::sleep(Duration::from_millis(600));
        let info: String = redis::cmd("INFO").arg("stats").query(&mut conn).unwrap();
        let active: u64 = info
            .lines()
            .find_map(|l| l.strip_prefix("expired_keys_active:"))
            .and_then(|v| v.trim().parse().ok())
            .unwrap();
        assert!(active > 0, "reaper never ran: {info}");
        let size: i64 = redis::cmd("DBSIZE").query(&mut conn).unwrap();
        assert_eq!(size, 1);
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_multi_exec_account() {
    with_server(17383, |mut conn| {
        let (a, b, c): (String, i64, i64) = redis::pipe()
            .atomic()
            .cmd("SET").arg("balance").arg(100)
            .cmd("DECRBY").arg("balance").arg(20)
            .cmd("DECRBY").arg("balance").arg(10)
            .query(&mut conn)
            .unwrap();
        assert_eq!((a.as_str(), b, c), ("OK", 80, 70));
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_multi_discard_and_state_errors() {
    with_server(17384, |mut conn| {
        let _: () = redis::cmd("MULTI").query(&mut conn).unwrap();
        let queued: String = redis::cmd("SET").arg("k").arg("v").query(&mut conn).unwrap();
        assert_eq!(queued, "QUEUED");
        let err = redis::cmd("MULTI").query::<()>(&mut conn).unwrap_err();
        assert!(err.to_string().contains("nested"));
        let _: () = redis::cmd("DISCARD").query(&mut conn).unwrap();
        let exists: bool = conn.exists("k").unwrap();
        assert!(!exists);

        let err = redis::cmd("EXEC").query::<()>(&mut conn).unwrap_err();
        assert!(err.to_string().contains("EXEC without MULTI"));
        let err = redis::cmd("DISCARD").query::<()>(&mut conn).unwrap_err();
        assert!(err.to_string().contains("DISCARD without MULTI"));
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_exec_abort_after_queue_error() {
    with_server(17385, |mut conn| {
        let _: () = redis::cmd("MULTI").query(&mut conn).unwrap();
        let _: String = redis::cmd("SET").arg("a").arg(1).query(&mut conn).unwrap();
        assert!(redis::cmd("NOSUCHCOMMAND").query::<()>(&mut conn).is_err());
        let err = redis::cmd("EXEC").query::<()>(&mut conn).unwrap_err();
        assert_eq!(err.code(), Some("EXECABORT"));
        let exists: bool = conn.exists("a").unwrap();
        assert!(!exists);
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_exec_keeps_going_after_runtime_error() {
    with_server(17386, |mut conn| {
        let _: () = redis::cmd("MULTI").query(&mut conn).unwrap();
        let _: String = redis::cmd("SET").arg("s").arg("text").query(&mut conn).unwrap();
        let _: String = redis::cmd("LPUSH").arg("s").arg("x").query(&mut conn).unwrap();
        let _: String = redis::cmd("SET").arg("after").arg("yes").query(&mut conn).unwrap();
        let replies: Vec<redis::Value> = redis::cmd("EXEC").query(&mut conn).unwrap();
        assert_eq!(replies.len(), 3);
        assert!(matches!(replies[1], redis::Value::ServerError(_)));
        let after: String = conn.get("after").unwrap();
        assert_eq!(after, "yes");
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_exec_batches_do_not_interleave() {
    let port = 17387;
    let _server = start_server(port);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let workers: Vec<_> = (0..4)
        .map(|_| {
            tokio::task::spawn_blocking(move || {
                let mut conn = get_client(port);
                for _ in 0..50 {
                    let (first, second): (i64, i64) = redis::pipe()
                        .atomic()
                        .incr("shared", 1)
                        .incr("shared", 1)
                        .query(&mut conn)
                        .unwrap();
                    assert_eq!(second, first + 1);
                }
            })
        })
        .collect();
    for w in workers {
        w.await.unwrap();
    }
    tokio::task::spawn_blocking(move || {
        let mut conn = get_client(port);
        let total: i64 = conn.get("shared").unwrap();
        assert_eq!(total, 4 * 50 * 2);
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_wrongtype_and_unknown_command() {
    with_server(17388, |mut conn| {
        let _: () = conn.set("str", "v").unwrap();
        let err = conn.lpush::<_, _, i64>("str", "x").unwrap_err();
        assert!(err.to_string().contains("WRONGTYPE"));
        let err = redis::cmd("FOOBAR").arg("x").query::<()>(&mut conn).unwrap_err();
        assert!(err.to_string().contains("unknown command"));
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_collections() {
    with_server(17389, |mut conn| {
        let _: () = conn.rpush("list", &["a", "b", "c"]).unwrap();
        let range: Vec<String> = conn.lrange("list", 0, -1).unwrap();
        assert_eq!(range, vec!["a", "b", "c"]);

        let _: () = conn.hset("user", "name", "ada").unwrap();
        let name: String = conn.hget("user", "name").unwrap();
        assert_eq!(name, "ada");

        let added: i64 = conn.sadd("tags", &["x", "y", "x"]).unwrap();
        assert_eq!(added, 2);
        let card: i64 = conn.scard("tags").unwrap();
        assert_eq!(card, 2);

        let _: () = conn.zadd("board", "alice", 30).unwrap();
        let _: () = conn.zadd("board", "bob", 10).unwrap();
        let top: Vec<String> = conn.zrevrange("board", 0, 0).unwrap();
        assert_eq!(top, vec!["alice"]);

        let t: String = redis::cmd("TYPE").arg("board").query(&mut conn).unwrap();
        assert_eq!(t, "zset");
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_hyperloglog_estimate() {
    with_server(17390, |mut conn| {
        for chunk in (0..1000).collect::<Vec<_>>().chunks(100) {
            let items: Vec<String> = chunk.iter().map(|i| format!("visitor:{i}")).collect();
            let _: i64 = redis::cmd("PFADD").arg("visitors").arg(&items).query(&mut conn).unwrap();
        }
        let count: i64 = redis::cmd("PFCOUNT").arg("visitors").query(&mut conn).unwrap();
        assert!((950..=1050).contains(&count), "estimate {count}");
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_publish_reaches_only_current_subscribers() {
    let port = 17391;
    let _server = start_server(port);
    tokio::time::sleep(Duration::from_millis(200)).await;

    tokio::task::spawn_blocking(move || {
        let mut publisher = get_client(port);
        let receivers: i64 = redis::cmd("PUBLISH").arg("news").arg("too early").query(&mut publisher).unwrap();
        assert_eq!(receivers, 0);

        let mut sub_conn = get_client(port);
        let mut pubsub = sub_conn.as_pubsub();
        pubsub.subscribe("news").unwrap();
        pubsub.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

        let receivers: i64 = redis::cmd("PUBLISH").arg("news").arg("hello").query(&mut publisher).unwrap();
        assert_eq!(receivers, 1);
        let msg = pubsub.get_message().unwrap();
        assert_eq!(msg.get_channel_name(), "news");
        let payload: String = msg.get_payload().unwrap();
        assert_eq!(payload, "hello");
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_scripts() {
    with_server(17392, |mut conn| {
        let script = redis::Script::new("redis.call('SET', KEYS[1], ARGV[1]); return redis.call('INCR', KEYS[1])");
        let val: i64 = script.key("n").arg(41).invoke(&mut conn).unwrap();
        assert_eq!(val, 42);

        let err = redis::cmd("EVALSHA").arg("0000000000000000000000000000000000000000").arg(0).query::<()>(&mut conn).unwrap_err();
        assert_eq!(err.code(), Some("NOSCRIPT"));
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_json_and_bloom() {
    with_server(17393, |mut conn| {
        let _: () = redis::cmd("JSON.SET").arg("doc").arg("$").arg(r#"{"n":1,"tags":["a"]}"#).query(&mut conn).unwrap();
        let n: String = redis::cmd("JSON.GET").arg("doc").arg("$.n").query(&mut conn).unwrap();
        assert_eq!(n, "1");

        let added: i64 = redis::cmd("BF.ADD").arg("seen").arg("url-1").query(&mut conn).unwrap();
        assert_eq!(added, 1);
        let exists: i64 = redis::cmd("BF.EXISTS").arg("seen").arg("url-1").query(&mut conn).unwrap();
        assert_eq!(exists, 1);
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_config_and_info() {
    with_server(17394, |mut conn| {
        let hz: Vec<String> = redis::cmd("CONFIG").arg("GET").arg("hz").query(&mut conn).unwrap();
        assert_eq!(hz, vec!["hz", "50"]);
        let _: () = redis::cmd("CONFIG").arg("SET").arg("hz").arg(20).query(&mut conn).unwrap();
        let hz: Vec<String> = redis::cmd("CONFIG").arg("GET").arg("hz").query(&mut conn).unwrap();
        assert_eq!(hz[1], "20");
        let info: String = redis::cmd("INFO").query(&mut conn).unwrap();
        assert!(info.contains("connected_clients:1"));
    })
    .await;
}
