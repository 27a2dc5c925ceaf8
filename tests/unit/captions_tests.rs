/*!
 * Tests for SRT caption handling
 */

use std::fs;

use anyhow::Result;
use narravid::captions::{CaptionSegment, CaptionTrack};
use crate::common;

#[test]
fn test_parseTimestamp_shouldAcceptCommaAndDot() -> Result<()> {
    assert_eq!(CaptionSegment::parse_timestamp("00:01:02,500")?, 62.5);
    assert_eq!(CaptionSegment::parse_timestamp(" 01:00:00.001 ")?, 3600.001);
    Ok(())
}

#[test]
fn test_parseTimestamp_withOutOfRangeFields_shouldFail() {
    assert!(CaptionSegment::parse_timestamp("00:60:00,000").is_err());
    assert!(CaptionSegment::parse_timestamp("00:00:61,000").is_err());
    assert!(CaptionSegment::parse_timestamp("00:00:01").is_err());
    assert!(CaptionSegment::parse_timestamp("aa:bb:cc,ddd").is_err());
}

/// Multi-line captions survive a write and a read
#[test]
fn test_writeToSrt_thenParse_shouldKeepMultilineText() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("nested").join("captions.srt");
    let track = CaptionTrack::parse_srt_string(
        "1\n00:00:00,000 --> 00:00:01,250\nTop line\nBottom line\n\n2\n00:00:01,250 --> 00:00:03,000\nNext\n",
    )?;

    track.write_to_srt(&path)?;
    let reread = CaptionTrack::parse_srt_string(&fs::read_to_string(&path)?)?;

    assert_eq!(reread, track);
    assert_eq!(reread.iter().next().map(|c| c.text.as_str()), Some("Top line\nBottom line"));
    assert_eq!(reread.end_seconds(), 3.0);
    Ok(())
}

#[test]
fn test_parseSrtString_withWindowsLineEndings_shouldParse() -> Result<()> {
    let track = CaptionTrack::parse_srt_string("1\r\n00:00:01,000 --> 00:00:02,000\r\nHello\r\n\r\n")?;

    assert_eq!(track.len(), 1);
    assert_eq!(track.iter().next().map(|c| c.duration_seconds()), Some(1.0));
    Ok(())
}

#[test]
fn test_parseSrtString_withoutEntries_shouldFail() {
    assert!(CaptionTrack::parse_srt_string("").is_err());
    assert!(CaptionTrack::parse_srt_string("just some text\n").is_err());
}

#[test]
fn test_emptyTrack_shouldRenderNothing() {
    let track = CaptionTrack::empty();

    assert!(track.is_empty());
    assert_eq!(track.to_srt(), "");
    assert_eq!(track.end_seconds(), 0.0);
}
