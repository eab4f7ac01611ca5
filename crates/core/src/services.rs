use crate::logging::LoggingService;
use crate::mapping::MappingService;
use crate::media::MediaFileService;

/// The mutable, run-scoped collaborators every converter works against.
///
/// Owned by the run driver and lent out `&mut` for one conversion at a time,
/// which keeps identifier allocation serialized within a run.
pub struct RunServices {
    pub mapping: MappingService,
    pub logger: LoggingService,
    pub media_files: MediaFileService,
}

impl RunServices {
    pub fn new(mapping: MappingService, logger: LoggingService, media_files: MediaFileService) -> Self {
        Self {
            mapping,
            logger,
            media_files,
        }
    }
}
