use strum::Display;

/// The tag carried by a `MENU_ITEM` response telling the caller what kind
/// of row it is (a track title, an artist, a color swatch used for
/// highlighting, a submenu to descend into, ...).
///
/// Rekordbox and newer players occasionally introduce tags this list
/// doesn't know about yet; `from_u32` maps those to `Unknown` instead of
/// failing the whole menu walk.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub(crate) enum MenuItemType {
    Folder = 0x0001,
    AlbumTitle = 0x0002,
    Disc = 0x0003,
    TrackTitle = 0x0004,
    Genre = 0x0006,
    Artist = 0x0007,
    Playlist = 0x0008,
    Rating = 0x000a,
    Duration = 0x000b,
    Tempo = 0x000d,
    Label = 0x000e,
    Key = 0x000f,
    BitRate = 0x0010,
    Year = 0x0011,
    ColorNone = 0x0013,
    ColorPink = 0x0014,
    ColorRed = 0x0015,
    ColorOrange = 0x0016,
    ColorYellow = 0x0017,
    ColorGreen = 0x0018,
    ColorAqua = 0x0019,
    ColorBlue = 0x001a,
    ColorPurple = 0x001b,
    Comment = 0x0023,
    HistoryPlaylist = 0x0024,
    OriginalArtist = 0x0028,
    Remixer = 0x0029,
    DateAdded = 0x002e,
    GenreMenu = 0x0080,
    ArtistMenu = 0x0081,
    AlbumMenu = 0x0082,
    TrackMenu = 0x0083,
    PlaylistMenu = 0x0084,
    BpmMenu = 0x0085,
    RatingMenu = 0x0086,
    YearMenu = 0x0087,
    RemixerMenu = 0x0088,
    LabelMenu = 0x0089,
    OriginalArtistMenu = 0x008a,
    KeyMenu = 0x008b,
    ColorMenu = 0x008e,
    FolderMenu = 0x0090,
    SearchMenu = 0x0091,
    TimeMenu = 0x0092,
    BitRateMenu = 0x0093,
    FilenameMenu = 0x0094,
    HistoryMenu = 0x0095,
    AllMenu = 0x0098,
    HotCueBankMenu = 0x0099,
    All = 0x00a0,
    /// A tag this table doesn't know about, kept so a menu walk degrades
    /// to "unlabeled field" instead of failing outright.
    Unknown(u32),
}

impl MenuItemType {
    pub(crate) fn from_u32(val: u32) -> MenuItemType {
        match val {
            0x0001 => Self::Folder,
            0x0002 => Self::AlbumTitle,
            0x0003 => Self::Disc,
            0x0004 => Self::TrackTitle,
            0x0006 => Self::Genre,
            0x0007 => Self::Artist,
            0x0008 => Self::Playlist,
            0x000a => Self::Rating,
            0x000b => Self::Duration,
            0x000d => Self::Tempo,
            0x000e => Self::Label,
            0x000f => Self::Key,
            0x0010 => Self::BitRate,
            0x0011 => Self::Year,
            0x0013 => Self::ColorNone,
            0x0014 => Self::ColorPink,
            0x0015 => Self::ColorRed,
            0x0016 => Self::ColorOrange,
            0x0017 => Self::ColorYellow,
            0x0018 => Self::ColorGreen,
            0x0019 => Self::ColorAqua,
            0x001a => Self::ColorBlue,
            0x001b => Self::ColorPurple,
            0x0023 => Self::Comment,
            0x0024 => Self::HistoryPlaylist,
            0x0028 => Self::OriginalArtist,
            0x0029 => Self::Remixer,
            0x002e => Self::DateAdded,
            0x0080 => Self::GenreMenu,
            0x0081 => Self::ArtistMenu,
            0x0082 => Self::AlbumMenu,
            0x0083 => Self::TrackMenu,
            0x0084 => Self::PlaylistMenu,
            0x0085 => Self::BpmMenu,
            0x0086 => Self::RatingMenu,
            0x0087 => Self::YearMenu,
            0x0088 => Self::RemixerMenu,
            0x0089 => Self::LabelMenu,
            0x008a => Self::OriginalArtistMenu,
            0x008b => Self::KeyMenu,
            0x008e => Self::ColorMenu,
            0x0090 => Self::FolderMenu,
            0x0091 => Self::SearchMenu,
            0x0092 => Self::TimeMenu,
            0x0093 => Self::BitRateMenu,
            0x0094 => Self::FilenameMenu,
            0x0095 => Self::HistoryMenu,
            0x0098 => Self::AllMenu,
            0x0099 => Self::HotCueBankMenu,
            0x00a0 => Self::All,
            other => Self::Unknown(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_round_trip_through_display() {
        assert_eq!(MenuItemType::from_u32(0x0004), MenuItemType::TrackTitle);
        assert_eq!(format!("{}", MenuItemType::TrackTitle), "TrackTitle");
    }

    #[test]
    fn unrecognized_codes_become_unknown() {
        assert_eq!(MenuItemType::from_u32(0xbeef), MenuItemType::Unknown(0xbeef));
    }
}
