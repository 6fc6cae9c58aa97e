//! Color management on moxcms: scan linearization, the working-space to
//! display transform and conversion into destination profiles.

mod curves;
mod space;

pub use curves::ChannelCurves;
pub use space::{
    apply_matrix, convert_to_destination, working_space, DestinationProfile, OutputSpace,
};

use moxcms::ColorProfile;

use crate::error::PipelineResult;
use crate::roll::SourceProfile;

/// Per-channel curves that linearize a scan's samples.
///
/// Untagged scans, and profiles without usable curves, are treated as
/// already linear.
pub fn source_curves(profile: &SourceProfile) -> ChannelCurves {
    let Some(bytes) = profile.icc_bytes() else {
        return ChannelCurves::linear();
    };
    match embedded_curves(bytes) {
        Ok(curves) => curves,
        Err(e) => {
            tracing::warn!("Ignoring unusable source profile, treating samples as linear: {e}");
            ChannelCurves::linear()
        }
    }
}

fn embedded_curves(bytes: &[u8]) -> PipelineResult<ChannelCurves> {
    let profile = ColorProfile::new_from_slice(bytes)?;
    ChannelCurves::linearizing(&profile)
}
