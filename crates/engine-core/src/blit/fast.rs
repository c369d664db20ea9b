//! Hardware copy, scaled blit and resolve.

use crate::backend::Backend;
use crate::render_target::{Attachment, RectPair};

use super::{BlitJob, BlitPath};

fn origin<B: Backend>(attachment: &Attachment<B>, rect: &RectPair) -> [u32; 3] {
    let r = rect.normalized();
    [r.min.x as u32, r.min.y as u32, attachment.layer + r.min.z as u32]
}

/// Record one hardware command for a path chosen by
/// [`select_path`](super::select_path).
pub(super) fn record<B: Backend>(
    backend: &B,
    cmd: &mut B::CommandBuffer,
    path: BlitPath,
    job: &BlitJob<'_, B>,
) {
    let BlitJob {
        src,
        src_rect,
        dst,
        dst_rect,
        filter,
        ..
    } = *job;
    match path {
        BlitPath::Copy => {
            debug_assert_eq!(src.format, dst.format, "copy between different formats");
            debug_assert_eq!(src_rect.width(), dst_rect.width(), "copy with scaling");
            debug_assert_eq!(src_rect.height(), dst_rect.height(), "copy with scaling");
            debug_assert!(!src_rect.is_mirrored() && !dst_rect.is_mirrored(), "mirrored copy");
            let extent = [src_rect.width(), src_rect.height(), 1];
            backend.cmd_copy_texture(
                cmd,
                src,
                origin(src, src_rect),
                dst,
                origin(dst, dst_rect),
                extent,
            );
        }
        BlitPath::Scale => {
            debug_assert!(
                src.samples == 1 && dst.samples == 1,
                "scaled blit between multisampled attachments"
            );
            backend.cmd_blit_texture(cmd, src, src_rect, dst, dst_rect, filter);
        }
        BlitPath::Resolve => {
            debug_assert!(src.samples > 1 && dst.samples == 1, "resolve needs MS -> single");
            debug_assert_eq!(src.extent(), dst.extent(), "resolve with scaling");
            backend.cmd_resolve_texture(cmd, src, dst);
        }
        BlitPath::Shader => unreachable!("shader blits are recorded by the slow path"),
    }
}
