// Buffer bounds
pub const REPLY_CAPACITY: usize = 64;
pub const VDM_BODY_CAPACITY: usize = 128;
pub const VDM_WORD_SIZE: usize = 4;
pub const MAX_CUSTOM_WORDS: usize = 8;

// Chips and ports
pub const DEFAULT_CHIP: u64 = 0;
pub const DFU_PORT_RID: u32 = 0; // DFU port always has RID 0

// Transport flags
pub const NO_FLAGS: u32 = 0;

// Register addresses
pub const REG_MODE: u8 = 0x03;
pub const REG_DATA: u8 = 0x09; // Command arguments in, result nibble out
pub const REG_CONNECTION_STATUS: u8 = 0x3F;

// Mode register tags
pub const MODE_TAG_APP: &[u8] = b"APP";
pub const MODE_TAG_DBMA: &[u8] = b"DBMa";
pub const MODE_TAG_LEN: usize = 4;

// Connection status
pub const CONNECTION_TYPE_MASK: u8 = 0b11;

// Command result
pub const COMMAND_RESULT_MASK: u8 = 0x0F;

// Command arguments
pub const ARG_DBMA_EXIT: u8 = 0x00;
pub const ARG_DBMA_ENTER: u8 = 0x01;
pub const UNLOCK_KEY_LEN: usize = 4;

// VDM transmission
pub const VDM_SELECTOR: u32 = 3;

// VDM main commands
pub const VDM_CMD_LIST: u32 = 0x05AC_8010;
pub const VDM_CMD_INFO: u32 = 0x05AC_8011;
pub const VDM_CMD_ACTION: u32 = 0x05AC_8012;

// VDM actions
pub const VDM_ACTION_REBOOT: u32 = 0x0105;
pub const VDM_ACTION_DFU: u32 = 0x0106;
pub const VDM_ACTION_DEBUG_USB: u32 = 0x4606;

// VDM action flags
pub const VDM_FLAG_LINE1: u32 = 1 << 17;
pub const VDM_FLAG_GRACEFUL: u32 = 1 << 23; // Exit conflicting modes if possible
pub const VDM_FLAG_PERSIST: u32 = 1 << 24; // Persist through soft reset
pub const VDM_FLAG_EXIT: u32 = 1 << 25; // Exit mode instead of enter

// VDM trailing parameter words
pub const VDM_REBOOT_PARAM: u32 = 0x8000_0000;
pub const VDM_DFU_PARAM: u32 = 0x8001_0000;
