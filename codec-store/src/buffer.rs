//! Buffers exchanged with components and the direct copy between them.
//!
//! A buffer's layout is fixed when it is allocated; only its content can
//! change afterwards. Graphic buffers store their planes back to back, each
//! plane `rows * stride` bytes.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Bytes, BytesMut};
use tokio::sync::Mutex;

use crate::status::StoreError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Gray8,
    Rgb888,
    Rgba8888,
    Nv12,
    Yuv420p,
}

/// Geometry of one plane: bytes of payload per row, rows, and row stride.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Plane {
    row_bytes: usize,
    rows: usize,
    stride: usize,
}

impl PixelFormat {
    fn planes(self, width: u32, height: u32, stride: u32) -> Vec<Plane> {
        let (w, h, s) = (width as usize, height as usize, stride as usize);
        let (cw, ch, cs) = (w.div_ceil(2), h.div_ceil(2), s.div_ceil(2));
        let plane = |row_bytes, rows, stride| Plane {
            row_bytes,
            rows,
            stride,
        };
        match self {
            PixelFormat::Gray8 => vec![plane(w, h, s)],
            PixelFormat::Rgb888 => vec![plane(w * 3, h, s)],
            PixelFormat::Rgba8888 => vec![plane(w * 4, h, s)],
            PixelFormat::Nv12 => vec![plane(w, h, s), plane(cw * 2, ch, s)],
            PixelFormat::Yuv420p => vec![plane(w, h, s), plane(cw, ch, cs), plane(cw, ch, cs)],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferLayout {
    Linear {
        capacity: usize,
    },
    Graphic {
        width: u32,
        height: u32,
        format: PixelFormat,
        /// Luma (or packed) row stride in bytes.
        stride: u32,
    },
}

impl BufferLayout {
    fn planes(&self) -> Vec<Plane> {
        match *self {
            BufferLayout::Linear { .. } => Vec::new(),
            BufferLayout::Graphic {
                width,
                height,
                format,
                stride,
            } => format.planes(width, height, stride),
        }
    }

    /// Bytes needed to hold the content.
    pub fn allocation_size(&self) -> usize {
        match self {
            BufferLayout::Linear { capacity } => *capacity,
            BufferLayout::Graphic { .. } => self.planes().iter().map(|p| p.rows * p.stride).sum(),
        }
    }
}

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

pub struct Buffer {
    id: u64,
    owner: u64,
    layout: BufferLayout,
    protected: bool,
    content: Mutex<BytesMut>,
}

impl Buffer {
    pub fn linear(owner: u64, capacity: usize) -> Self {
        Self::with_layout(
            owner,
            BufferLayout::Linear { capacity },
            BytesMut::with_capacity(capacity),
        )
    }

    pub fn graphic(
        owner: u64,
        width: u32,
        height: u32,
        format: PixelFormat,
        stride: u32,
    ) -> anyhow::Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow::anyhow!("graphic buffer needs a non-zero size"));
        }
        let layout = BufferLayout::Graphic {
            width,
            height,
            format,
            stride,
        };
        if layout.planes().iter().any(|p| p.stride < p.row_bytes) {
            return Err(anyhow::anyhow!(
                "stride {} too small for {}x{} {:?}",
                stride,
                width,
                height,
                format
            ));
        }
        let size = layout.allocation_size();
        Ok(Self::with_layout(owner, layout, BytesMut::zeroed(size)))
    }

    fn with_layout(owner: u64, layout: BufferLayout, content: BytesMut) -> Self {
        Self {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            owner,
            layout,
            protected: false,
            content: Mutex::new(content),
        }
    }

    /// Marks the buffer as protected: only its owner may copy from or into it.
    pub fn protect(mut self) -> Self {
        self.protected = true;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn owner(&self) -> u64 {
        self.owner
    }

    pub fn layout(&self) -> BufferLayout {
        self.layout
    }

    pub fn is_protected(&self) -> bool {
        self.protected
    }

    pub async fn read(&self) -> Bytes {
        Bytes::copy_from_slice(&self.content.lock().await)
    }

    /// Replaces the content. Graphic buffers take exactly their allocation size.
    pub async fn write(&self, data: &[u8]) -> anyhow::Result<()> {
        let size = self.layout.allocation_size();
        match self.layout {
            BufferLayout::Linear { .. } if data.len() > size => {
                return Err(anyhow::anyhow!("{} bytes exceed capacity {}", data.len(), size));
            }
            BufferLayout::Graphic { .. } if data.len() != size => {
                return Err(anyhow::anyhow!(
                    "graphic content must be {} bytes, got {}",
                    size,
                    data.len()
                ));
            }
            _ => {}
        }
        let mut content = self.content.lock().await;
        content.clear();
        content.extend_from_slice(data);
        Ok(())
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("layout", &self.layout)
            .field("protected", &self.protected)
            .finish()
    }
}

/// Copies `src`'s content into `dst`, leaving `dst`'s layout untouched.
pub async fn copy_buffer(src: &Buffer, dst: &Buffer) -> Result<(), StoreError> {
    if src.id == dst.id {
        return Ok(());
    }
    if (src.protected || dst.protected) && src.owner != dst.owner {
        return Err(StoreError::Refused(format!(
            "buffer {} -> {} crosses owners {} -> {} on a protected buffer",
            src.id, dst.id, src.owner, dst.owner
        )));
    }
    check_compatible(&src.layout, &dst.layout)?;

    // lock in id order so opposite copies cannot deadlock
    let (src_content, mut dst_content) = if src.id < dst.id {
        let s = src.content.lock().await;
        let d = dst.content.lock().await;
        (s, d)
    } else {
        let d = dst.content.lock().await;
        let s = src.content.lock().await;
        (s, d)
    };

    match dst.layout {
        BufferLayout::Linear { capacity } => {
            if src_content.len() > capacity {
                return Err(StoreError::CannotDo(format!(
                    "{} bytes do not fit into capacity {}",
                    src_content.len(),
                    capacity
                )));
            }
            dst_content.clear();
            dst_content.extend_from_slice(&src_content);
        }
        BufferLayout::Graphic { .. } => {
            let mut src_offset = 0;
            let mut dst_offset = 0;
            for (sp, dp) in src.layout.planes().iter().zip(dst.layout.planes().iter()) {
                for row in 0..sp.rows {
                    let s = src_offset + row * sp.stride;
                    let d = dst_offset + row * dp.stride;
                    dst_content[d..d + dp.row_bytes]
                        .copy_from_slice(&src_content[s..s + sp.row_bytes]);
                }
                src_offset += sp.rows * sp.stride;
                dst_offset += dp.rows * dp.stride;
            }
        }
    }
    log::debug!("copied buffer {} -> {}", src.id, dst.id);
    Ok(())
}

fn check_compatible(src: &BufferLayout, dst: &BufferLayout) -> Result<(), StoreError> {
    match (src, dst) {
        (BufferLayout::Linear { .. }, BufferLayout::Linear { .. }) => Ok(()),
        (
            BufferLayout::Graphic {
                width: sw,
                height: sh,
                format: sf,
                ..
            },
            BufferLayout::Graphic {
                width: dw,
                height: dh,
                format: df,
                ..
            },
        ) if sw == dw && sh == dh && sf == df => Ok(()),
        _ => Err(StoreError::CannotDo(format!(
            "incompatible layouts {:?} -> {:?}",
            src, dst
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Status;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_linear_copy_keeps_layout() -> anyhow::Result<()> {
        let src = Buffer::linear(1, 16);
        let dst = Buffer::linear(1, 64);
        src.write(b"hello codec").await?;

        copy_buffer(&src, &dst).await?;
        assert_eq!(dst.read().await, src.read().await);
        assert_eq!(dst.layout(), BufferLayout::Linear { capacity: 64 });
        Ok(())
    }

    #[tokio::test]
    async fn test_linear_copy_too_large() -> anyhow::Result<()> {
        let src = Buffer::linear(1, 16);
        let dst = Buffer::linear(1, 4);
        src.write(b"0123456789").await?;
        dst.write(b"keep").await?;

        let err = copy_buffer(&src, &dst).await.unwrap_err();
        assert_eq!(err.status(), Status::CannotDo);
        assert_eq!(&dst.read().await[..], b"keep");
        Ok(())
    }

    #[tokio::test]
    async fn test_graphic_copy_across_strides() -> anyhow::Result<()> {
        let src = Buffer::graphic(1, 4, 2, PixelFormat::Yuv420p, 4)?;
        let dst = Buffer::graphic(1, 4, 2, PixelFormat::Yuv420p, 8)?;
        assert_eq!(src.layout().allocation_size(), 8 + 2 + 2);
        assert_eq!(dst.layout().allocation_size(), 16 + 4 + 4);

        let data = pattern(12);
        src.write(&data).await?;
        copy_buffer(&src, &dst).await?;

        let out = dst.read().await;
        // luma rows
        assert_eq!(&out[0..4], &data[0..4]);
        assert_eq!(&out[8..12], &data[4..8]);
        // chroma planes, one row each
        assert_eq!(&out[16..18], &data[8..10]);
        assert_eq!(&out[20..22], &data[10..12]);
        assert_eq!(
            dst.layout(),
            BufferLayout::Graphic {
                width: 4,
                height: 2,
                format: PixelFormat::Yuv420p,
                stride: 8
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_same_layout_content_equal() -> anyhow::Result<()> {
        let src = Buffer::graphic(7, 3, 3, PixelFormat::Rgba8888, 12)?;
        let dst = Buffer::graphic(7, 3, 3, PixelFormat::Rgba8888, 12)?;
        src.write(&pattern(36)).await?;
        copy_buffer(&src, &dst).await?;
        assert_eq!(dst.read().await, src.read().await);
        Ok(())
    }

    #[tokio::test]
    async fn test_incompatible_and_refused() -> anyhow::Result<()> {
        let linear = Buffer::linear(1, 64);
        let graphic = Buffer::graphic(1, 4, 4, PixelFormat::Gray8, 4)?;
        let err = copy_buffer(&linear, &graphic).await.unwrap_err();
        assert_eq!(err.status(), Status::CannotDo);

        let other = Buffer::graphic(1, 4, 4, PixelFormat::Nv12, 4)?;
        let err = copy_buffer(&graphic, &other).await.unwrap_err();
        assert_eq!(err.status(), Status::CannotDo);

        let secret = Buffer::linear(1, 8).protect();
        let foreign = Buffer::linear(2, 8);
        let err = copy_buffer(&secret, &foreign).await.unwrap_err();
        assert_eq!(err.status(), Status::Refused);

        let mine = Buffer::linear(1, 8);
        copy_buffer(&secret, &mine).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_self_copy_is_noop() -> anyhow::Result<()> {
        let b = Buffer::linear(1, 8);
        b.write(b"abc").await?;
        copy_buffer(&b, &b).await?;
        assert_eq!(&b.read().await[..], b"abc");
        Ok(())
    }

    #[test]
    fn test_stride_too_small() {
        assert!(Buffer::graphic(1, 4, 4, PixelFormat::Rgb888, 8).is_err());
        assert!(Buffer::graphic(1, 0, 4, PixelFormat::Gray8, 8).is_err());
    }
}
