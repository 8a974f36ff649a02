use serde::Deserialize;

use super::ByteBuf;
use crate::error::{Result, config_error};

/// 默认最小接收尺寸。
pub const DEFAULT_MINIMUM: usize = 64;
/// 默认初始接收尺寸。
pub const DEFAULT_INITIAL: usize = 1024;
/// 默认最大接收尺寸。
pub const DEFAULT_MAXIMUM: usize = 65536;

const INDEX_INCREMENT: usize = 4;
const INDEX_DECREMENT: usize = 1;

/// 候选接收尺寸表，严格递增。
///
/// 前段以 16 为步长覆盖小包，后段倍增至 64 KiB。
pub const SIZE_TABLE: [usize; 27] = [
    0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0x80, 0x90, //
    0x100, 0x110, 0x120, 0x130, 0x140, 0x150, 0x160, 0x170, 0x180, //
    0x190, 0x200, 0x400, 0x800, 0x1000, 0x2000, 0x4000, 0x8000, 0x10000,
];

/// 返回不小于 `size` 的最小表项下标；`size` 超过表尾时返回最后一个下标。
pub fn size_table_index(size: usize) -> usize {
    SIZE_TABLE
        .partition_point(|candidate| *candidate < size)
        .min(SIZE_TABLE.len() - 1)
}

/// 接收缓冲尺寸配置。
///
/// # 契约说明（What）
/// - `0 < minimum ≤ initial ≤ maximum`，由 [`validate`](Self::validate) 在构造估算器时检查；
/// - 可从 TOML/JSON 等配置源反序列化，缺省字段取默认值。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RecvBufferConfig {
    pub minimum: usize,
    pub initial: usize,
    pub maximum: usize,
}

impl Default for RecvBufferConfig {
    fn default() -> Self {
        Self {
            minimum: DEFAULT_MINIMUM,
            initial: DEFAULT_INITIAL,
            maximum: DEFAULT_MAXIMUM,
        }
    }
}

impl RecvBufferConfig {
    pub const fn new(minimum: usize, initial: usize, maximum: usize) -> Self {
        Self {
            minimum,
            initial,
            maximum,
        }
    }

    /// 校验数值契约，失败时返回 `config.invalid`。
    pub fn validate(&self) -> Result<()> {
        if self.minimum == 0 {
            return Err(config_error("receive buffer minimum must be positive"));
        }
        if self.initial < self.minimum {
            return Err(config_error(format!(
                "receive buffer initial ({}) must not be below minimum ({})",
                self.initial, self.minimum
            )));
        }
        if self.maximum < self.initial {
            return Err(config_error(format!(
                "receive buffer maximum ({}) must not be below initial ({})",
                self.maximum, self.initial
            )));
        }
        Ok(())
    }
}

/// 自适应接收尺寸估算器，每个连接独占一个实例。
///
/// # 设计背景（Why）
/// - 每次读取都按最大尺寸分配会浪费内存，固定小尺寸又会在突发流量下放大系统调用次数；
///   估算器根据“上一次读到多少字节”预测下一次的缓冲尺寸。
///
/// # 逻辑解析（How）
/// - 读满预测尺寸时立即上调 [`INDEX_INCREMENT`] 档（快速增长）；
/// - 连续两次读取明显小于预测时才下调 [`INDEX_DECREMENT`] 档（滞回收缩），单次小包不会引起收缩，
///   避免在大小包交替时来回震荡。
///
/// # 契约说明（What）
/// - **不变式**：`min_index ≤ index ≤ max_index`，预测尺寸恒为 `SIZE_TABLE[index]`。
/// - 构造时最小值上取到不小于它的表项、最大值下取到不大于它的表项。
#[derive(Clone, Debug)]
pub struct RecvSizeEstimator {
    min_index: usize,
    max_index: usize,
    index: usize,
    shrink_pending: bool,
}

impl RecvSizeEstimator {
    /// 按配置构造估算器，非法配置立即失败。
    pub fn new(config: RecvBufferConfig) -> Result<Self> {
        config.validate()?;

        let mut min_index = size_table_index(config.minimum);
        if SIZE_TABLE[min_index] < config.minimum {
            min_index += 1;
        }
        let max_index = match size_table_index(config.maximum) {
            index if SIZE_TABLE[index] <= config.maximum => Some(index),
            // 最大值小于最小表项时没有可用的下取表项。
            index => index.checked_sub(1),
        };
        let Some(max_index) =
            max_index.filter(|&max| min_index < SIZE_TABLE.len() && min_index <= max)
        else {
            return Err(config_error(format!(
                "receive buffer range [{}, {}] does not cover any table size",
                config.minimum, config.maximum
            )));
        };
        let index = size_table_index(config.initial).clamp(min_index, max_index);

        Ok(Self {
            min_index,
            max_index,
            index,
            shrink_pending: false,
        })
    }

    /// 下一次读取使用的缓冲尺寸。
    pub fn next_size(&self) -> usize {
        SIZE_TABLE[self.index]
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn min_index(&self) -> usize {
        self.min_index
    }

    pub fn max_index(&self) -> usize {
        self.max_index
    }

    /// 分配容量为预测尺寸的新缓冲。
    pub fn allocate(&self) -> Result<ByteBuf> {
        ByteBuf::with_capacity(self.next_size())
    }

    /// 记录一次读取的实际字节数，调整下一次预测。
    pub fn record(&mut self, bytes_read: usize) {
        // 表首处收缩阈值等于预测尺寸，读满优先判定为增长。
        if bytes_read >= self.next_size() {
            self.index = (self.index + INDEX_INCREMENT).min(self.max_index);
            self.shrink_pending = false;
            return;
        }
        let shrink_floor = SIZE_TABLE[self.index.saturating_sub(INDEX_DECREMENT + 1)];
        if bytes_read <= shrink_floor {
            if self.shrink_pending {
                self.index = self
                    .index
                    .saturating_sub(INDEX_DECREMENT)
                    .max(self.min_index);
                self.shrink_pending = false;
            } else {
                self.shrink_pending = true;
            }
        }
    }
}

impl Default for RecvSizeEstimator {
    fn default() -> Self {
        let index = size_table_index(DEFAULT_INITIAL);
        Self {
            min_index: size_table_index(DEFAULT_MINIMUM),
            max_index: size_table_index(DEFAULT_MAXIMUM),
            index,
            shrink_pending: false,
        }
    }
}
