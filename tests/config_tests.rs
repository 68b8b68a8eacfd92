//! 配置测试

use active_thread_stream::{Error, WorkerConfig};

// 环境变量是进程级的，放在同一个测试里顺序执行
#[test]
fn test_config_from_env() {
    std::env::remove_var("ATC_REACTIVE_QUEUE_CAPACITY");
    std::env::remove_var("ATC_SUBSCRIBER_CAPACITY");
    assert_eq!(WorkerConfig::from_env().unwrap(), WorkerConfig::default());

    std::env::set_var("ATC_REACTIVE_QUEUE_CAPACITY", "8");
    std::env::set_var("ATC_SUBSCRIBER_CAPACITY", "16");
    let config = WorkerConfig::from_env().unwrap();
    assert_eq!(config.reactive_queue_capacity, 8);
    assert_eq!(config.subscriber_capacity, 16);

    std::env::set_var("ATC_SUBSCRIBER_CAPACITY", "0");
    assert!(matches!(WorkerConfig::from_env(), Err(Error::Config(_))));

    std::env::set_var("ATC_SUBSCRIBER_CAPACITY", "lots");
    assert!(matches!(WorkerConfig::from_env(), Err(Error::Config(_))));

    std::env::remove_var("ATC_REACTIVE_QUEUE_CAPACITY");
    std::env::remove_var("ATC_SUBSCRIBER_CAPACITY");
}
