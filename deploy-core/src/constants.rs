//! 全局常量定义
//!
//! 路径、文件名、超时时间等默认值都集中在这里，`AppConfig::default()` 从这里取值。

/// 服务相关常量
pub mod service {
    /// 服务名称（同时作为备份目录前缀）
    pub const SERVICE_NAME: &str = "meet-bot";
    /// systemd 单元文件名
    pub const UNIT_FILE_NAME: &str = "meet-bot.service";
    /// 运行服务的系统用户
    pub const SERVICE_USER: &str = "meet-bot";
    /// 健康检查地址
    pub const HEALTH_URL: &str = "http://127.0.0.1:5000/health";
    /// 版本文件不存在时的版本号
    pub const UNKNOWN_VERSION: &str = "unknown";
    /// status 命令展示的日志行数
    pub const RECENT_LOG_LINES: usize = 10;
}

/// 路径相关常量
pub mod paths {
    /// 默认配置文件路径
    pub const DEFAULT_CONFIG_FILE: &str = "/etc/meet-bot/deploy.toml";
    /// 安装目录
    pub const INSTALL_DIR: &str = "/opt/meet-bot";
    /// 配置目录（包含凭证，备份时会过滤）
    pub const CONFIG_DIR: &str = "/etc/meet-bot";
    /// systemd 单元目录
    pub const SYSTEMD_DIR: &str = "/etc/systemd/system";
    /// 备份根目录
    pub const BACKUP_ROOT: &str = "/var/backups/meet-bot";
    /// 最近一次备份的指针文件（位于备份根目录下）
    pub const LAST_BACKUP_FILE: &str = "last_backup.toml";
    /// 互斥锁文件（位于备份根目录下）
    pub const LOCK_FILE: &str = ".deploy.lock";
    /// 安装目录下的 Python 虚拟环境
    pub const VENV_DIR: &str = "venv";
}

/// 发布包相关常量
pub mod bundle {
    /// 应用入口文件
    pub const APP_FILE: &str = "app.py";
    /// 依赖清单
    pub const REQUIREMENTS_FILE: &str = "requirements.txt";
    /// 版本文件
    pub const VERSION_FILE: &str = "VERSION";
    /// 合成版本号的日期格式
    pub const VERSION_DATE_FORMAT: &str = "%Y.%m.%d";
}

/// 备份相关常量
pub mod backup {
    /// 默认保留的备份数量
    pub const DEFAULT_RETAIN: usize = 5;
    /// 备份中的应用目录
    pub const APP_DIR: &str = "app";
    /// 备份中的配置目录
    pub const CONFIG_DIR: &str = "config";
    /// 备份元数据文件（最后写入）
    pub const INFO_FILE: &str = "backup_info";
    /// 备份目录名中的时间戳格式
    pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";
    /// 不进入备份的凭证文件
    pub const SECRET_PATTERNS: &[&str] = &[
        "service-account.json",
        "oauth-credentials.json",
        "token.json",
        "token.pickle",
        ".env",
        "*.key",
        "*.pem",
    ];
}

/// 超时相关常量（单位：秒）
pub mod timeout {
    /// 停止服务超时
    pub const SERVICE_STOP_TIMEOUT: u64 = 30;
    /// 启动服务超时
    pub const SERVICE_START_TIMEOUT: u64 = 30;
    /// 服务状态轮询间隔
    pub const SERVICE_CHECK_INTERVAL: u64 = 1;
    /// 健康检查前的等待时间
    pub const HEALTH_GRACE_DELAY: u64 = 5;
    /// 健康检查请求超时
    pub const HEALTH_REQUEST_TIMEOUT: u64 = 10;
}
