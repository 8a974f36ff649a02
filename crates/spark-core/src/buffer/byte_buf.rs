use std::fmt;
use std::io;

use crate::error::{CoreError, Result, codes};

/// 扩容时的大缓冲阈值：低于该值按倍增扩容，达到或超过后按阈值整块递增。
pub const CALCULATE_THRESHOLD: usize = 4 * 1024 * 1024;

/// 倍增扩容的起点。
pub const MIN_NEW_CAPACITY: usize = 64;

/// 多字节数值的字节序。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    #[default]
    BigEndian,
    LittleEndian,
}

/// 游标式可增长字节缓冲。
///
/// # 设计背景（Why）
/// - 传输层按预测尺寸读入字节、解码器在其上增量拼帧、编码器在其上写出前缀，三方以“单一所有者移交”
///   的方式共享同一缓冲，因此结构体不做内部加锁，可变借用由所有者独占。
/// - 读写游标相互独立，配合 `mark/reset` 支撑投机式解析。
///
/// # 逻辑解析（How）
/// - `storage.len()` 即容量；`[reader, writer)` 为可读区域，`[writer, capacity)` 为可写区域。
/// - 顺序写入先执行 [`ensure_writable`](Self::ensure_writable)：若压缩已读前缀即可腾出空间则原地压缩，
///   否则按 [`calculate_new_capacity`] 重新分配并同时压缩。
/// - 所有多字节访问器均提供大端与小端两个版本；浮点数按 IEEE-754 位模式传输。
///
/// # 契约说明（What）
/// - **不变式**：任何公开方法返回时 `0 ≤ reader ≤ writer ≤ capacity ≤ max_capacity`。
/// - 顺序读取越过写游标返回 `buffer.insufficient_readable_bytes`；随机访问越过容量返回
///   `buffer.index_out_of_range`；写入所需空间超出 `max_capacity` 返回 `buffer.out_of_capacity`。
/// - 扩容永不截断尚未读取的数据；扩容后绝对下标会因压缩而平移，`get/set` 需基于 `reader_index()` 计算。
///
/// # 风险提示（Trade-offs）
/// - 压缩与扩容都会搬移数据，频繁写入大块数据时应预先以足够容量构造。
#[derive(Clone)]
pub struct ByteBuf {
    storage: Vec<u8>,
    reader: usize,
    writer: usize,
    marked_reader: usize,
    marked_writer: usize,
    max_capacity: usize,
}

impl ByteBuf {
    /// 以给定初始容量构造缓冲，容量上限为 `usize::MAX`。
    ///
    /// 零容量构造立即失败，返回 `buffer.zero_capacity`。
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Self::with_max_capacity(capacity, usize::MAX)
    }

    /// 以初始容量与容量上限构造缓冲。
    pub fn with_max_capacity(capacity: usize, max_capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(CoreError::new(
                codes::BUFFER_ZERO_CAPACITY,
                "byte buffer capacity must be positive",
            ));
        }
        if capacity > max_capacity {
            return Err(CoreError::new(
                codes::CONFIG_INVALID,
                format!("initial capacity {capacity} exceeds max capacity {max_capacity}"),
            ));
        }
        Ok(Self::from_parts(vec![0; capacity], 0, max_capacity))
    }

    /// 接管一段已写满的字节作为可读区域。
    pub fn wrap(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(CoreError::new(
                codes::BUFFER_ZERO_CAPACITY,
                "cannot wrap an empty byte vector",
            ));
        }
        Ok(Self::readable_from(bytes))
    }

    /// 复制切片内容构造缓冲。
    pub fn copy_from_slice(bytes: &[u8]) -> Result<Self> {
        Self::wrap(bytes.to_vec())
    }

    /// 内部构造：字节全部可读，允许为空（例如空帧）。
    pub(crate) fn readable_from(bytes: Vec<u8>) -> Self {
        let writer = bytes.len();
        Self::from_parts(bytes, writer, usize::MAX)
    }

    fn from_parts(storage: Vec<u8>, writer: usize, max_capacity: usize) -> Self {
        Self {
            storage,
            reader: 0,
            writer,
            marked_reader: 0,
            marked_writer: 0,
            max_capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    pub fn reader_index(&self) -> usize {
        self.reader
    }

    pub fn writer_index(&self) -> usize {
        self.writer
    }

    /// `writer - reader`。
    pub fn readable_bytes(&self) -> usize {
        self.writer - self.reader
    }

    /// `capacity - writer`。
    pub fn writable_bytes(&self) -> usize {
        self.capacity() - self.writer
    }

    pub fn is_readable(&self) -> bool {
        self.writer > self.reader
    }

    /// 设置读游标，要求 `index ≤ writer`。
    pub fn set_reader_index(&mut self, index: usize) -> Result<()> {
        if index > self.writer {
            return Err(self.index_error(format!(
                "reader index {index} exceeds writer index {}",
                self.writer
            )));
        }
        self.reader = index;
        Ok(())
    }

    /// 设置写游标，要求 `reader ≤ index ≤ capacity`。
    pub fn set_writer_index(&mut self, index: usize) -> Result<()> {
        if index < self.reader || index > self.capacity() {
            return Err(self.index_error(format!(
                "writer index {index} outside [{}, {}]",
                self.reader,
                self.capacity()
            )));
        }
        self.writer = index;
        Ok(())
    }

    pub fn mark_reader_index(&mut self) {
        self.marked_reader = self.reader;
    }

    /// 回退读游标到最近一次标记。
    pub fn reset_reader_index(&mut self) -> Result<()> {
        self.set_reader_index(self.marked_reader)
    }

    pub fn mark_writer_index(&mut self) {
        self.marked_writer = self.writer;
    }

    /// 回退写游标到最近一次标记。
    pub fn reset_writer_index(&mut self) -> Result<()> {
        self.set_writer_index(self.marked_writer)
    }

    /// 清空游标与标记，不释放存储。
    pub fn clear(&mut self) {
        self.reader = 0;
        self.writer = 0;
        self.marked_reader = 0;
        self.marked_writer = 0;
    }

    /// 丢弃已读字节：把 `[reader, writer)` 平移到起点并同步调整游标与标记；`reader == 0` 时为空操作。
    pub fn discard_read_bytes(&mut self) {
        if self.reader == 0 {
            return;
        }
        let decrement = self.reader;
        if self.reader != self.writer {
            self.storage.copy_within(self.reader..self.writer, 0);
        }
        self.writer -= decrement;
        self.reader = 0;
        self.adjust_marks(decrement);
    }

    fn adjust_marks(&mut self, decrement: usize) {
        if self.marked_reader <= decrement {
            self.marked_reader = 0;
            self.marked_writer = self.marked_writer.saturating_sub(decrement);
        } else {
            self.marked_reader -= decrement;
            self.marked_writer = self.marked_writer.saturating_sub(decrement);
        }
    }

    /// 保证至少还能写入 `needed` 字节。
    ///
    /// # 执行步骤（How）
    /// 1. 可写空间已足够时直接返回；
    /// 2. 未读数据加上 `needed` 超过 `max_capacity` 时返回 `buffer.out_of_capacity`；
    /// 3. 压缩已读前缀即可满足时原地压缩；
    /// 4. 否则按 [`calculate_new_capacity`] 分配新存储，复制未读区域到起点。
    pub fn ensure_writable(&mut self, needed: usize) -> Result<()> {
        if needed <= self.writable_bytes() {
            return Ok(());
        }
        let readable = self.readable_bytes();
        let required = readable
            .checked_add(needed)
            .filter(|required| *required <= self.max_capacity)
            .ok_or_else(|| {
                CoreError::new(
                    codes::BUFFER_OUT_OF_CAPACITY,
                    format!(
                        "writing {needed} bytes needs more than max capacity {} (readable={readable})",
                        self.max_capacity
                    ),
                )
            })?;

        if self.capacity() >= required {
            self.discard_read_bytes();
            return Ok(());
        }

        let new_capacity = calculate_new_capacity(required, self.max_capacity);
        let mut storage = vec![0; new_capacity];
        storage[..readable].copy_from_slice(&self.storage[self.reader..self.writer]);
        let decrement = self.reader;
        self.storage = storage;
        self.reader = 0;
        self.writer = readable;
        self.adjust_marks(decrement);
        Ok(())
    }

    /// 可读区域的只读视图。
    pub fn readable_slice(&self) -> &[u8] {
        &self.storage[self.reader..self.writer]
    }

    /// 可写区域的可变视图，配合 [`advance_writer`](Self::advance_writer) 使用。
    pub fn writable_slice_mut(&mut self) -> &mut [u8] {
        let writer = self.writer;
        &mut self.storage[writer..]
    }

    /// 在外部直接填充可写区域后推进写游标。
    pub fn advance_writer(&mut self, count: usize) -> Result<()> {
        if count > self.writable_bytes() {
            return Err(self.index_error(format!(
                "cannot advance writer by {count}, only {} writable",
                self.writable_bytes()
            )));
        }
        self.writer += count;
        Ok(())
    }

    /// 顺序写入字节切片。
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_writable(bytes.len())?;
        let writer = self.writer;
        self.storage[writer..writer + bytes.len()].copy_from_slice(bytes);
        self.writer += bytes.len();
        Ok(())
    }

    /// 复制另一缓冲的可读区域，不消费对方、不转移所有权。
    pub fn write_slice(&mut self, other: &ByteBuf) -> Result<()> {
        self.write_bytes(other.readable_slice())
    }

    /// 顺序读取到目标切片，读取长度等于切片长度。
    pub fn read_into(&mut self, dst: &mut [u8]) -> Result<()> {
        self.check_readable(dst.len())?;
        dst.copy_from_slice(&self.storage[self.reader..self.reader + dst.len()]);
        self.reader += dst.len();
        Ok(())
    }

    /// 顺序读取 `length` 字节为新的独立缓冲。
    pub fn read_slice(&mut self, length: usize) -> Result<ByteBuf> {
        self.check_readable(length)?;
        let slice = self.storage[self.reader..self.reader + length].to_vec();
        self.reader += length;
        Ok(ByteBuf::readable_from(slice))
    }

    /// 跳过 `length` 个可读字节。
    pub fn skip(&mut self, length: usize) -> Result<()> {
        self.check_readable(length)?;
        self.reader += length;
        Ok(())
    }

    /// 按绝对下标读取一段字节，不移动游标。
    pub fn get_bytes(&self, index: usize, length: usize) -> Result<&[u8]> {
        self.check_index(index, length)?;
        Ok(&self.storage[index..index + length])
    }

    /// 按绝对下标覆盖一段字节，不移动游标。
    pub fn set_bytes(&mut self, index: usize, bytes: &[u8]) -> Result<()> {
        self.check_index(index, bytes.len())?;
        self.storage[index..index + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// 在可读区域中查找 `needle`，返回相对 `reader` 的偏移。
    pub fn index_of(&self, needle: &[u8]) -> Option<usize> {
        if needle.is_empty() {
            return Some(0);
        }
        self.readable_slice()
            .windows(needle.len())
            .position(|window| window == needle)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        self.read_u8().map(|byte| byte != 0)
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8(u8::from(value))
    }

    pub fn get_bool(&self, index: usize) -> Result<bool> {
        self.get_u8(index).map(|byte| byte != 0)
    }

    pub fn set_bool(&mut self, index: usize, value: bool) -> Result<()> {
        self.set_u8(index, u8::from(value))
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.read_array::<1>().map(|[byte]| byte)
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    pub fn get_u8(&self, index: usize) -> Result<u8> {
        self.get_array::<1>(index).map(|[byte]| byte)
    }

    pub fn set_u8(&mut self, index: usize, value: u8) -> Result<()> {
        self.set_bytes(index, &[value])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        self.read_array().map(i8::from_be_bytes)
    }

    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn get_i8(&self, index: usize) -> Result<i8> {
        self.get_array(index).map(i8::from_be_bytes)
    }

    pub fn set_i8(&mut self, index: usize, value: i8) -> Result<()> {
        self.set_bytes(index, &value.to_be_bytes())
    }

    /// 按字节序读取 `width` 字节（1/2/4/8）的无符号整数，不移动游标。
    pub fn get_uint(&self, index: usize, width: usize, order: ByteOrder) -> Result<u64> {
        let bytes = self.get_bytes(index, width)?;
        if !matches!(width, 1 | 2 | 4 | 8) {
            return Err(CoreError::new(
                codes::CONFIG_INVALID,
                format!("unsupported integer width {width} (expected 1, 2, 4 or 8)"),
            ));
        }
        let value = match order {
            ByteOrder::BigEndian => bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)),
            ByteOrder::LittleEndian => bytes
                .iter()
                .rev()
                .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)),
        };
        Ok(value)
    }

    /// 按字节序顺序写入 `width` 字节（1/2/4/8）的无符号整数，高位截断由调用方事先校验。
    pub fn write_uint(&mut self, value: u64, width: usize, order: ByteOrder) -> Result<()> {
        let bytes = match order {
            ByteOrder::BigEndian => value.to_be_bytes(),
            ByteOrder::LittleEndian => value.to_le_bytes(),
        };
        match (width, order) {
            (1 | 2 | 4 | 8, ByteOrder::BigEndian) => self.write_bytes(&bytes[8 - width..]),
            (1 | 2 | 4 | 8, ByteOrder::LittleEndian) => self.write_bytes(&bytes[..width]),
            _ => Err(CoreError::new(
                codes::CONFIG_INVALID,
                format!("unsupported integer width {width} (expected 1, 2, 4 or 8)"),
            )),
        }
    }

    /// 把可读区域写入字节汇，并按实际写出量推进读游标。
    ///
    /// 写出量少于可读量时返回 `buffer.short_write`，此时读游标已推进到实际写出位置；
    /// 完整写出后丢弃已读字节。
    pub fn write_to<W: io::Write + ?Sized>(&mut self, sink: &mut W) -> Result<usize> {
        let readable = self.readable_bytes();
        if readable == 0 {
            return Ok(0);
        }
        let written = sink
            .write(self.readable_slice())
            .map_err(|err| io_error("write to sink", err))?
            .min(readable);
        self.reader += written;
        if written != readable {
            return Err(CoreError::new(
                codes::BUFFER_SHORT_WRITE,
                format!("short write: {written} of {readable} bytes"),
            ));
        }
        self.discard_read_bytes();
        Ok(written)
    }

    /// 从字节源执行一次读取并推进写游标；无可写空间时先扩容。
    pub fn read_from<R: io::Read + ?Sized>(&mut self, source: &mut R) -> Result<usize> {
        if self.writable_bytes() == 0 {
            self.ensure_writable(1)?;
        }
        let read = source
            .read(self.writable_slice_mut())
            .map_err(|err| io_error("read from source", err))?;
        self.advance_writer(read)?;
        Ok(read)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.check_readable(N)?;
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&self.storage[self.reader..self.reader + N]);
        self.reader += N;
        Ok(bytes)
    }

    fn get_array<const N: usize>(&self, index: usize) -> Result<[u8; N]> {
        self.check_index(index, N)?;
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&self.storage[index..index + N]);
        Ok(bytes)
    }

    fn check_readable(&self, length: usize) -> Result<()> {
        if length > self.readable_bytes() {
            return Err(CoreError::new(
                codes::BUFFER_INSUFFICIENT_READABLE,
                format!(
                    "need {length} readable bytes, have {} (reader={}, writer={})",
                    self.readable_bytes(),
                    self.reader,
                    self.writer
                ),
            ));
        }
        Ok(())
    }

    fn check_index(&self, index: usize, width: usize) -> Result<()> {
        if index
            .checked_add(width)
            .is_none_or(|end| end > self.capacity())
        {
            return Err(self.index_error(format!(
                "index {index} with width {width} exceeds capacity {}",
                self.capacity()
            )));
        }
        Ok(())
    }

    fn index_error(&self, message: String) -> CoreError {
        CoreError::new(codes::BUFFER_INDEX_OUT_OF_RANGE, message)
    }
}

macro_rules! numeric_accessors {
    ($($ty:ty => [$read:ident, $read_le:ident, $write:ident, $write_le:ident, $get:ident, $get_le:ident, $set:ident, $set_le:ident]);* $(;)?) => {
        impl ByteBuf {
            $(
                #[doc = concat!("顺序读取大端 `", stringify!($ty), "`。")]
                pub fn $read(&mut self) -> Result<$ty> {
                    self.read_array().map(<$ty>::from_be_bytes)
                }

                #[doc = concat!("顺序读取小端 `", stringify!($ty), "`。")]
                pub fn $read_le(&mut self) -> Result<$ty> {
                    self.read_array().map(<$ty>::from_le_bytes)
                }

                #[doc = concat!("顺序写入大端 `", stringify!($ty), "`。")]
                pub fn $write(&mut self, value: $ty) -> Result<()> {
                    self.write_bytes(&value.to_be_bytes())
                }

                #[doc = concat!("顺序写入小端 `", stringify!($ty), "`。")]
                pub fn $write_le(&mut self, value: $ty) -> Result<()> {
                    self.write_bytes(&value.to_le_bytes())
                }

                #[doc = concat!("按绝对下标读取大端 `", stringify!($ty), "`。")]
                pub fn $get(&self, index: usize) -> Result<$ty> {
                    self.get_array(index).map(<$ty>::from_be_bytes)
                }

                #[doc = concat!("按绝对下标读取小端 `", stringify!($ty), "`。")]
                pub fn $get_le(&self, index: usize) -> Result<$ty> {
                    self.get_array(index).map(<$ty>::from_le_bytes)
                }

                #[doc = concat!("按绝对下标写入大端 `", stringify!($ty), "`。")]
                pub fn $set(&mut self, index: usize, value: $ty) -> Result<()> {
                    self.set_bytes(index, &value.to_be_bytes())
                }

                #[doc = concat!("按绝对下标写入小端 `", stringify!($ty), "`。")]
                pub fn $set_le(&mut self, index: usize, value: $ty) -> Result<()> {
                    self.set_bytes(index, &value.to_le_bytes())
                }
            )*
        }
    };
}

numeric_accessors! {
    u16 => [read_u16, read_u16_le, write_u16, write_u16_le, get_u16, get_u16_le, set_u16, set_u16_le];
    i16 => [read_i16, read_i16_le, write_i16, write_i16_le, get_i16, get_i16_le, set_i16, set_i16_le];
    u32 => [read_u32, read_u32_le, write_u32, write_u32_le, get_u32, get_u32_le, set_u32, set_u32_le];
    i32 => [read_i32, read_i32_le, write_i32, write_i32_le, get_i32, get_i32_le, set_i32, set_i32_le];
    u64 => [read_u64, read_u64_le, write_u64, write_u64_le, get_u64, get_u64_le, set_u64, set_u64_le];
    i64 => [read_i64, read_i64_le, write_i64, write_i64_le, get_i64, get_i64_le, set_i64, set_i64_le];
    f32 => [read_f32, read_f32_le, write_f32, write_f32_le, get_f32, get_f32_le, set_f32, set_f32_le];
    f64 => [read_f64, read_f64_le, write_f64, write_f64_le, get_f64, get_f64_le, set_f64, set_f64_le];
}

/// 计算满足 `required` 的新容量。
///
/// - `required == CALCULATE_THRESHOLD`：直接返回阈值；
/// - `required > CALCULATE_THRESHOLD`：向上取整到阈值的整数倍；
/// - 否则自 [`MIN_NEW_CAPACITY`] 起倍增直到不小于 `required`。
///
/// 结果不超过 `max_capacity`。
pub fn calculate_new_capacity(required: usize, max_capacity: usize) -> usize {
    let capacity = if required == CALCULATE_THRESHOLD {
        CALCULATE_THRESHOLD
    } else if required > CALCULATE_THRESHOLD {
        required
            .div_ceil(CALCULATE_THRESHOLD)
            .saturating_mul(CALCULATE_THRESHOLD)
    } else {
        let mut capacity = MIN_NEW_CAPACITY;
        while capacity < required {
            capacity <<= 1;
        }
        capacity
    };
    capacity.min(max_capacity)
}

fn io_error(operation: &'static str, err: io::Error) -> CoreError {
    CoreError::new(codes::BUFFER_IO, format!("{operation}: {err}")).with_cause(err)
}

impl bytes::Buf for ByteBuf {
    fn remaining(&self) -> usize {
        self.readable_bytes()
    }

    fn chunk(&self) -> &[u8] {
        self.readable_slice()
    }

    /// 与 `bytes::Buf` 契约一致：越过可读区域时 panic。
    fn advance(&mut self, cnt: usize) {
        let remaining = self.readable_bytes();
        assert!(
            cnt <= remaining,
            "cannot advance past remaining: {cnt} > {remaining}"
        );
        self.reader += cnt;
    }
}

impl PartialEq for ByteBuf {
    fn eq(&self, other: &Self) -> bool {
        self.readable_slice() == other.readable_slice()
    }
}

impl Eq for ByteBuf {}

impl fmt::Debug for ByteBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteBuf")
            .field("reader", &self.reader)
            .field("writer", &self.writer)
            .field("capacity", &self.capacity())
            .finish()
    }
}
