use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ディレクトリが見つかりません")]
    ConfigDirNotFound,

    #[error(
        "設定ファイルが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: site.local.yaml, .site.local.yaml, site.yaml, .site.yaml\n\
        - ./.sitestack/ ディレクトリ\n\
        - ~/.config/sitestack/site.yaml\n\
        または SITESTACK_CONFIG_PATH 環境変数で直接指定できます"
    )]
    SiteFileNotFound,

    #[error("必須項目 {0} が設定されていません")]
    MissingField(&'static str),

    #[error("バケット名 '{name}' が不正です: {reason}")]
    InvalidBucketName { name: String, reason: &'static str },

    #[error("ドメイン名 '{name}' が不正です: {reason}")]
    InvalidDomainName { name: String, reason: &'static str },

    #[error("地域コード '{0}' が不正です (ISO 3166-1 alpha-2 の大文字2文字)")]
    InvalidGeoLocation(String),

    #[error("設定ファイルの解析に失敗しました: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
