// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use dashmap::DashMap;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use tracing::warn;

use crate::config::settings::CrawlerSettings;

/// 主机闸门配置
#[derive(Clone, Debug)]
pub struct GateConfig {
    /// 每个主机的最大并发请求数
    pub max_concurrency: usize,
    /// 连续失败阈值
    pub failure_threshold: u32,
    /// 熔断冷却时间
    pub cooldown: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 2,
            failure_threshold: 5,
            cooldown: Duration::from_secs(3600),
        }
    }
}

impl From<&CrawlerSettings> for GateConfig {
    fn from(settings: &CrawlerSettings) -> Self {
        Self {
            max_concurrency: settings.domain_max_concurrency,
            failure_threshold: settings.domain_fail_threshold,
            cooldown: Duration::from_secs(settings.domain_cooldown_secs),
        }
    }
}

/// 主机熔断状态
#[derive(Clone, Debug, Default)]
struct DomainState {
    /// 连续失败次数
    consecutive_failures: u32,
    /// 冷却截止时间
    cooldown_until: Option<Instant>,
}

/// 单个主机的登记项
struct HostEntry {
    slots: Arc<Semaphore>,
    state: Mutex<DomainState>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl HostEntry {
    fn new(max_concurrency: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max_concurrency.max(1))),
            state: Mutex::new(DomainState::default()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }
}

/// 并发槽位许可
///
/// 持有期间占用主机的一个并发槽位；被丢弃时（包括超时取消和错误路径）自动归还
pub struct SlotPermit {
    host: String,
    entry: Arc<HostEntry>,
    _permit: OwnedSemaphorePermit,
}

impl SlotPermit {
    /// 许可所属主机
    pub fn host(&self) -> &str {
        &self.host
    }

    /// 显式归还槽位
    pub fn release(self) {}
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.entry.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 主机闸门
///
/// 按主机实施两条准入规则：并发上限和连续失败熔断。
/// 主机登记项在首次引用时惰性创建，状态按主机独立加锁
#[derive(Clone)]
pub struct DomainGate {
    config: GateConfig,
    hosts: Arc<DashMap<String, Arc<HostEntry>>>,
}

impl Default for DomainGate {
    fn default() -> Self {
        Self::new(GateConfig::default())
    }
}

impl DomainGate {
    /// 创建新的主机闸门
    ///
    /// # 参数
    ///
    /// * `config` - 闸门配置
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            hosts: Arc::new(DashMap::new()),
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    fn entry(&self, host: &str) -> Arc<HostEntry> {
        if let Some(entry) = self.hosts.get(host) {
            return entry.clone();
        }
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(HostEntry::new(self.config.max_concurrency)))
            .clone()
    }

    /// 获取主机并发槽位，槽位已满时等待
    ///
    /// # 返回值
    ///
    /// 返回槽位许可，丢弃许可即归还槽位
    pub async fn acquire_slot(&self, host: &str) -> Result<SlotPermit, AcquireError> {
        let entry = self.entry(host);
        let permit = entry.slots.clone().acquire_owned().await?;

        let now_in_flight = entry.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        entry.peak_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        Ok(SlotPermit {
            host: host.to_string(),
            entry,
            _permit: permit,
        })
    }

    /// 检查主机是否允许派发
    ///
    /// # 返回值
    ///
    /// 主机处于冷却期（`now < cooldown_until`）时返回false
    pub fn is_allowed(&self, host: &str, now: Instant) -> bool {
        let entry = self.entry(host);
        let state = entry.state.lock();
        match state.cooldown_until {
            Some(until) if now < until => {
                counter!("domain_gate_rejected_total").increment(1);
                false
            }
            _ => true,
        }
    }

    /// 记录一次失败
    ///
    /// # 返回值
    ///
    /// 本次失败触发熔断时返回true
    pub fn record_failure(&self, host: &str) -> bool {
        self.record_failure_at(host, Instant::now())
    }

    /// 以指定时间记录一次失败
    pub fn record_failure_at(&self, host: &str, now: Instant) -> bool {
        let entry = self.entry(host);
        let mut state = entry.state.lock();
        state.consecutive_failures += 1;

        if state.consecutive_failures >= self.config.failure_threshold {
            state.cooldown_until = Some(now + self.config.cooldown);
            state.consecutive_failures = 0;
            counter!("domain_gate_trips_total").increment(1);
            gauge!("domain_gate_open_hosts").increment(1.0);
            warn!(
                "Host {} tripped after {} consecutive failures, cooling down for {:?}",
                host, self.config.failure_threshold, self.config.cooldown
            );
            return true;
        }
        false
    }

    /// 记录一次成功，清零连续失败计数
    pub fn record_success(&self, host: &str) {
        let entry = self.entry(host);
        let mut state = entry.state.lock();
        state.consecutive_failures = 0;
    }

    /// 当前连续失败次数
    pub fn consecutive_failures(&self, host: &str) -> u32 {
        self.hosts
            .get(host)
            .map(|e| e.state.lock().consecutive_failures)
            .unwrap_or(0)
    }

    /// 冷却截止时间
    pub fn cooldown_until(&self, host: &str) -> Option<Instant> {
        self.hosts.get(host).and_then(|e| e.state.lock().cooldown_until)
    }

    /// 当前在途请求数
    pub fn in_flight(&self, host: &str) -> usize {
        self.hosts
            .get(host)
            .map(|e| e.in_flight.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// 历史最大在途请求数
    pub fn peak_in_flight(&self, host: &str) -> usize {
        self.hosts
            .get(host)
            .map(|e| e.peak_in_flight.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// 当前空闲槽位数
    pub fn available_slots(&self, host: &str) -> usize {
        self.hosts
            .get(host)
            .map(|e| e.slots.available_permits())
            .unwrap_or(self.config.max_concurrency)
    }
}
